//! Command line inspector for legacy binary map files
//!
//! Imports a map file and prints a summary of its contents together with
//! any diagnostics collected during the import. Useful for checking a
//! file before opening it in an editor, and for debugging import issues.

use clap::Parser;
use orimap_map::SymbolKind;
use orimap_ocd::{ImportOutput, OcdFileImport, OcdError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Map file to inspect
    file: PathBuf,

    /// Decode the symbol library only, skipping objects and templates
    #[arg(long)]
    symbols_only: bool,

    /// List every symbol instead of per-kind counts
    #[arg(long)]
    list_symbols: bool,
}

fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_err() {
        // Diagnostics are printed explicitly; keep tracing quiet by default
        // Safety: single-threaded at startup
        unsafe {
            std::env::set_var("RUST_LOG", "error");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut import = match OcdFileImport::from_path(&cli.file) {
        Ok(import) => import,
        Err(err) => {
            eprintln!("Cannot read {}: {}", cli.file.display(), err);
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    if let Err(err) = import.import(cli.symbols_only) {
        eprintln!("Cannot import {}: {}", cli.file.display(), err);
        return ExitCode::FAILURE;
    }
    match import.finish_import() {
        Ok(()) => {}
        Err(err @ OcdError::UnresolvedParts { .. }) => {
            // The map is still usable; report the failure alongside it
            eprintln!("Import incomplete: {}", err);
            failed = true;
        }
        Err(err) => {
            eprintln!("Cannot import {}: {}", cli.file.display(), err);
            return ExitCode::FAILURE;
        }
    }

    let output = import.into_output();
    print_summary(&cli, &output);

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_summary(cli: &Cli, output: &ImportOutput) {
    let map = &output.map;
    println!("{}", cli.file.display());
    println!("  colors:  {}", map.colors().len());
    println!("  symbols: {}", map.symbols().len());
    println!("  objects: {}", map.num_objects());
    if !map.templates().is_empty() {
        println!("  templates:");
        for template in map.templates() {
            println!("    {}", template.path);
        }
    }

    let georef = map.georeferencing();
    println!("  scale:   1:{}", georef.scale_denominator());
    if georef.is_local() {
        println!("  crs:     local coordinates");
    } else {
        println!("  crs:     {}", georef.projected_crs_id());
        println!(
            "  origin:  {:.1} E {:.1} N",
            georef.projected_ref_point().x,
            georef.projected_ref_point().y
        );
    }

    if cli.list_symbols {
        for symbol in map.symbols() {
            println!("  [{:>6}] {} ({})", symbol.source_number, symbol.name, kind_name(&symbol.kind));
        }
    }

    for warning in output.diagnostics.warnings() {
        println!("  warning: {}", warning);
    }
    for error in output.diagnostics.errors() {
        println!("  error:   {}", error);
    }
}

fn kind_name(kind: &SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Point { .. } => "point",
        SymbolKind::Line { .. } => "line",
        SymbolKind::Area { .. } => "area",
        SymbolKind::Text { .. } => "text",
        SymbolKind::Combined { .. } => "combined",
    }
}
