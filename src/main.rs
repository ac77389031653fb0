use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use malaria_dashboard::types::{DashboardData, Selection};
use malaria_dashboard::{config, data, processing, render, server};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard server
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Export the charts and the district map as PNG images
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "DIR", default_value = "output")]
        out_dir: PathBuf,
        /// Indicator to render; defaults to the configured one
        #[arg(short, long)]
        indicator: Option<String>,
    },
    /// Validate the data files and report district mismatches
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

fn pick_indicator(
    requested: Option<String>,
    config: &config::AppConfig,
    data: &DashboardData,
) -> anyhow::Result<String> {
    requested
        .or_else(|| config.map.default_indicator.clone())
        .or_else(|| data.indicators.first().cloned())
        .context("No indicator available: the CSV contains no usable rows")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(&config)?;
            let data = data::load_data(&app_config)
                .context("Failed to load the dashboard data files")?;
            server::start_server(app_config, data).await?;
        }
        Commands::Render {
            config,
            out_dir,
            indicator,
        } => {
            let app_config = config::AppConfig::load_from_file(&config)?;
            let data = data::load_data(&app_config)
                .context("Failed to load the dashboard data files")?;

            let indicator = pick_indicator(indicator, &app_config, &data)?;
            let selection = Selection {
                indicator: indicator.clone(),
                ..Default::default()
            };

            let rows = processing::filter_records(&data.records, &selection);
            let bar = render::build_bar_chart(&rows);
            let line = render::build_line_chart(&rows);
            let values = processing::choropleth_values(&rows);
            let ramp = render::ColorRamp::from_config(&app_config.map);

            render::export_pngs(&out_dir, &indicator, &bar, &line, &data.districts, &values, &ramp)?;
        }
        Commands::Check { config } => {
            let app_config = config::AppConfig::load_from_file(&config)?;
            let data = data::load_data(&app_config)
                .context("Failed to load the dashboard data files")?;

            println!("Indicator rows:      {}", data.records.len());
            println!("District boundaries: {}", data.districts.len());
            println!("Indicators:          {}", data.indicators.join(", "));
            match data.years {
                Some((from, to)) => println!("Year span:           {}-{}", from, to),
                None => println!("Year span:           (no rows)"),
            }

            let (csv_only, boundary_only) = data::mismatches(&data.records, &data.districts);
            if csv_only.is_empty() && boundary_only.is_empty() {
                println!("District join:       clean, every CSV district has a boundary");
            } else {
                for district in &csv_only {
                    println!("District join:       '{}' in CSV but not in boundary file (unplotted)", district);
                }
                for district in &boundary_only {
                    println!("District join:       '{}' in boundary file but has no CSV rows (neutral fill)", district);
                }
            }
        }
    }

    Ok(())
}
