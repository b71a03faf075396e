use clap::{Parser, Subcommand};
use cpu_probe::core::config::ProbeConfig;
use cpu_probe::core::diagnostics::{feature_table, HostReport};
use cpu_probe::core::hardware::CpuDetector;
use cpu_probe::core::sensors::{ClockSource, ModelSource, SysfsSensors, ThermalSource};
use cpu_probe::simd::get_dot_product;
use serde_json::json;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "cpu-probe", author, version, about = "Report host CPU capabilities and sensors", long_about = None)]
struct Args {
    /// TOML file overriding sensor paths
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq)]
enum Command {
    /// Full diagnostics (default)
    Report,
    /// Instruction-set extensions and the preferred one
    Features,
    /// Brand string, vendor and signature
    Brand,
    /// Temperature, clock and OS model name
    Sensors,
    /// Kernel variant selected for this host
    Dispatch,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            ProbeConfig::load(path)?
        }
        None => ProbeConfig::default(),
    };

    let detector = CpuDetector::native();
    let sensors = SysfsSensors::new(config.sensors);

    match args.command.unwrap_or(Command::Report) {
        Command::Report => {
            let report = HostReport::collect(&detector, &sensors);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Command::Features => {
            let table = feature_table(&detector);
            let best = detector.best_feature_label();
            if args.json {
                let out = json!({ "best_feature": best, "features": table });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for status in &table {
                    println!("{:<8} {}", status.name, status.support);
                }
                println!("Best: {}", if best.is_empty() { "none" } else { best.as_str() });
            }
        }
        Command::Brand => {
            let brand = detector.brand_string();
            let vendor = detector.vendor_id();
            let sig = detector.signature();
            if args.json {
                let out = json!({ "brand": brand, "vendor": vendor, "signature": sig });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Brand:     {}", brand);
                println!("Vendor:    {}", vendor);
                println!("Family:    {:#x}", sig.family);
                println!("Model:     {:#x}", sig.model);
                println!("Stepping:  {}", sig.stepping);
            }
        }
        Command::Sensors => {
            let temperature = sensors.temperature_celsius();
            let clock = sensors.frequency_khz();
            let name = sensors.model_name();
            let id = sensors.model_id();
            if args.json {
                let out = json!({
                    "temperature_c": temperature,
                    "clock_khz": clock,
                    "model_name": name,
                    "model_id": id,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Temperature: {:.1} C", temperature);
                println!("Clock:       {} kHz", clock);
                println!("Model name:  {}", name);
                println!("Model id:    {}", id);
            }
        }
        Command::Dispatch => {
            let (path, _) = get_dot_product();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&json!({ "code_path": path }))?);
            } else {
                println!("{}", path);
            }
        }
    }

    Ok(())
}
