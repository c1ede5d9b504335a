use std::env;
use std::fs;
use std::path::PathBuf;
use uvccamera::catalog::{CapabilityCatalog, FormatType};
use uvccamera::config::UvcCameraConfig;
use uvccamera::controls::all_controls;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    uvccamera::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: uvccamera-cli <formats|controls|init-config> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "formats" => cmd_formats(&args),
        "controls" => cmd_controls(&args),
        "init-config" => cmd_init_config(&args),
        "version" => {
            let info = uvccamera::get_info();
            println!("{} {}", info.name, info.version);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn cmd_formats(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    // Parse args: formats <blob.json> [--all|--mjpeg|--yuyv] [--json]
    let mut path = None;
    let mut filter = None;
    let mut json = false;

    for arg in &args[2..] {
        match arg.as_str() {
            "--all" => filter = None,
            "--mjpeg" => filter = Some(FormatType::Mjpeg),
            "--yuyv" => filter = Some(FormatType::Uncompressed),
            "--json" => json = true,
            _ => {
                if path.is_none() {
                    path = Some(arg.clone());
                }
            }
        }
    }

    let path = path.ok_or("capability blob path required")?;
    let text = fs::read_to_string(&path)?;
    let catalog = CapabilityCatalog::parse(text);
    let sizes = catalog.sizes_for(filter);

    if json {
        println!("{}", serde_json::to_string(&sizes)?);
    } else {
        for d in &sizes {
            println!("{:?} #{} {}x{}", d.format_type, d.index, d.width, d.height);
        }
        if catalog.is_incomplete() {
            eprintln!("warning: {} malformed entries skipped", catalog.skipped());
        }
    }
    Ok(())
}

fn cmd_controls(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let controls = all_controls();
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&controls)?);
    } else {
        for info in controls {
            println!(
                "{:<24} {:<8} {:<15} 0x{:08x}",
                info.name,
                format!("{:?}", info.mode),
                format!("{:?}", info.unit),
                info.flag as u32
            );
        }
    }
    Ok(())
}

fn cmd_init_config(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(UvcCameraConfig::default_path);
    if path.exists() {
        return Err(format!("{} already exists", path.display()).into());
    }
    UvcCameraConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
