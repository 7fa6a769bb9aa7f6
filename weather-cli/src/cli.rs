use anyhow::{Context, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, PasswordDisplayMode};
use weather_core::{
    Config, FallbackOrchestrator, NormalizedWeather, ProviderId, Resolution, WeatherQuery,
    provider::build_http_client,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Current weather for a city")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a provider and optionally make it primary.
    Configure {
        /// Provider short name, e.g. "weatherapi" or "open-meteo".
        provider: String,
    },

    /// Show current weather for a city.
    Show {
        /// City name.
        city: String,

        /// Print the normalized record as JSON.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show { city, json } => show(&city, json).await,
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if id.requires_api_key() {
        let api_key = Password::new(&format!("API key for {id}:"))
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .context("failed to read API key")?;

        let api_key = api_key.trim();
        if api_key.is_empty() {
            bail!("API key for '{id}' must not be empty");
        }
        config.upsert_provider_api_key(id, api_key.to_owned());
    } else {
        println!("{id} does not need an API key.");
    }

    if config.primary_provider_id()? != id {
        let make_primary = Confirm::new(&format!("Use {id} as the primary provider?"))
            .with_default(false)
            .prompt()
            .context("failed to read answer")?;
        if make_primary {
            config.set_primary_provider(id);
        }
    }

    config.save()?;
    println!(
        "Saved configuration to {} (primary: {}, secondary: {}).",
        Config::config_file_path()?.display(),
        config.primary_provider_id()?,
        config.secondary_provider_id()?,
    );

    Ok(())
}

async fn show(city: &str, json: bool) -> anyhow::Result<()> {
    let query = WeatherQuery::new(city)?;

    let mut config = Config::load()?;
    config.apply_env(|key| std::env::var(key).ok())?;

    let http = build_http_client(&config)?;
    let orchestrator = FallbackOrchestrator::from_config(&config, http)?;

    let weather = match orchestrator.resolve(&query).await {
        Resolution::Primary(weather) => weather,
        Resolution::Fallback { weather, primary_failure } => {
            eprintln!("note: {primary_failure}; using {}", weather.source_provider);
            weather
        }
        Resolution::Exhausted(err) => {
            let [primary, secondary] = err.details();
            bail!("no provider could answer for '{}':\n  {primary}\n  {secondary}", query.city());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&weather)?);
    } else {
        print!("{}", render(&weather));
    }

    Ok(())
}

fn render(weather: &NormalizedWeather) -> String {
    let mut out = format!(
        "{}: {:.1}°C, {}\n",
        weather.city, weather.temperature_celsius, weather.condition
    );

    if let Some(humidity) = weather.humidity_percent {
        out.push_str(&format!("  humidity: {humidity:.0}%\n"));
    }
    if let Some(wind) = weather.wind_speed_kph {
        out.push_str(&format!("  wind: {wind:.1} km/h\n"));
    }
    if let (Some(lat), Some(lon)) = (weather.latitude, weather.longitude) {
        out.push_str(&format!("  location: {lat:.2}, {lon:.2}\n"));
    }

    let observed = weather.observed_at.with_timezone(&Local);
    out.push_str(&format!(
        "  observed: {} via {}\n",
        observed.format("%Y-%m-%d %H:%M %Z"),
        weather.source_provider
    ));

    out
}
