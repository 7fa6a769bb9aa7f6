//! Unit conversions into the canonical Celsius / km/h system.

const KPH_PER_MPH: f64 = 1.609344;
const KPH_PER_MPS: f64 = 3.6;
const KPH_PER_KNOT: f64 = 1.852;

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn mph_to_kph(mph: f64) -> f64 {
    mph * KPH_PER_MPH
}

pub fn mps_to_kph(mps: f64) -> f64 {
    mps * KPH_PER_MPS
}

pub fn knots_to_kph(knots: f64) -> f64 {
    knots * KPH_PER_KNOT
}
