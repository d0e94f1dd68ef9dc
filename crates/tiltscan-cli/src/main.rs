//! `tiltscan-cli` – tiltscan Command Line Interface
//!
//! This binary drives the pan/tilt scanner.  It:
//!
//! 1. Loads `~/.tiltscan/config.toml`, writing the defaults on first run.
//! 2. Opens the simulated or serial scan hardware.
//! 3. Either drops the user into an **interactive REPL** (default), runs a
//!    single sweep and exports it (`tiltscan scan [dir]`), or serves the HTTP
//!    cockpit (`tiltscan serve`).
//! 4. Intercepts **Ctrl-C** to cancel the active sweep; the rig is parked
//!    before the sweep returns.

mod config;
mod hardware;
mod repl;

use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

use tiltscan_cockpit::CockpitServer;
use tiltscan_runtime::{ScanService, ServiceConfig};
use tiltscan_types::SweepState;

fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with the progress line.
    // TILTSCAN_LOG_FORMAT=json switches to newline-delimited JSON.
    let _telemetry = tiltscan_runtime::init_tracing("tiltscan-cli");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = args.first().map(String::as_str);
    if matches!(mode, Some("-h" | "--help" | "help")) {
        print_usage();
        return ExitCode::SUCCESS;
    }

    print_banner();
    let cfg = load_config();

    // ── Hardware ──────────────────────────────────────────────────────────
    print!("  Opening {} hardware … ", cfg.hardware.backend.to_string().bold());
    let hardware = match hardware::open(&cfg.hardware, &cfg.sweep) {
        Ok(hw) => {
            println!("{}", "OK".green());
            hw
        }
        Err(e) => {
            println!("{}: {}", "FAILED".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let service = ScanService::new(
        hardware,
        ServiceConfig {
            sampler: cfg.sampler.clone(),
            reconstruction: cfg.reconstruction.clone(),
        },
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let service_ctrlc = service.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        match on_interrupt(&service_ctrlc) {
            Interrupt::CancelSweep => {
                println!("{}", "⚠  Ctrl-C received – cancelling the active sweep …".yellow().bold());
            }
            Interrupt::Exit => {
                println!("{}", "  ✓ Exiting tiltscan.".green());
                std::process::exit(130);
            }
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not cancel sweeps");
    }

    match mode {
        None | Some("repl") => {
            println!();
            println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
            repl::run(repl::Shell::new(service, cfg));
            ExitCode::SUCCESS
        }
        Some("scan") => {
            let dir = args.get(1).map_or_else(|| cfg.output_dir.clone(), PathBuf::from);
            match repl::run_scan(&service, cfg.sweep.clone()) {
                Some(session) if session.state == SweepState::Completed => {
                    if repl::export_all(&service, &dir) {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    }
                }
                _ => ExitCode::FAILURE,
            }
        }
        Some("serve") => serve(service, &cfg),
        Some(other) => {
            println!("{} '{}'", "Unknown mode:".red(), other.yellow());
            print_usage();
            ExitCode::from(2)
        }
    }
}

/// What a Ctrl-C does.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// A sweep was running and has been asked to stop.
    CancelSweep,
    /// Nothing to cancel; the process should exit.
    Exit,
}

fn on_interrupt(service: &ScanService) -> Interrupt {
    if service.cancel() {
        Interrupt::CancelSweep
    } else {
        Interrupt::Exit
    }
}

fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::load_or_default();
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {} (use {} to change it)",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold(),
                    "/settings".bold().cyan()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::load_or_default()
        }
    }
}

fn serve(service: ScanService, cfg: &config::Config) -> ExitCode {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Cannot start async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  Cockpit serving on {}",
        format!("http://localhost:{}/", cfg.cockpit_port).bold()
    );
    let server = CockpitServer::new(service, cfg.sweep.clone()).with_port(cfg.cockpit_port);
    match rt.block_on(server.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Cockpit failed".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _   _ _ _                       "#.bold().cyan());
    println!("{}", r#" | |_(_) | |_ ___  ___ __ _ _ _  "#.bold().cyan());
    println!("{}", r#" |  _| | |  _(_-< / _/ _` | ' \ "#.bold().cyan());
    println!("{}", r#"  \__|_|_|\__/__/ \__\__,_|_||_|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "tiltscan".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Pan/tilt range scanner");
    println!();
}

fn print_usage() {
    println!("{}", "Usage:".bold());
    println!("  tiltscan              interactive shell");
    println!("  tiltscan scan [dir]   run one sweep and export it");
    println!("  tiltscan serve        serve the HTTP cockpit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tiltscan_hal::{ActuatorSource, DistanceSource};
    use tiltscan_runtime::ScanHardware;
    use tiltscan_types::{Axis, RawFrame, ScanError, StartOutcome, SweepConfig};

    struct StillRig;

    impl ActuatorSource for StillRig {
        fn move_to(&mut self, _axis: Axis, _angle_deg: f64) -> Result<(), ScanError> {
            Ok(())
        }
        fn park(&mut self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    /// Holds each read until the test sends a frame.
    struct HeldSource(mpsc::Receiver<()>);

    impl DistanceSource for HeldSource {
        fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
            self.0
                .recv_timeout(Duration::from_secs(5))
                .map(|()| tiltscan_hal::sim::frame(70))
                .map_err(|_| ScanError::HardwareFault {
                    component: "held".to_string(),
                    details: "released".to_string(),
                })
        }
    }

    #[test]
    fn interrupt_cancels_a_running_sweep_then_exits() {
        let (tx, rx) = mpsc::channel();
        let service = ScanService::new(
            ScanHardware::new(StillRig, HeldSource(rx)),
            ServiceConfig::default(),
        );
        assert_eq!(on_interrupt(&service), Interrupt::Exit);

        assert!(matches!(
            service.start_sweep(SweepConfig::default()).unwrap(),
            StartOutcome::Accepted(_)
        ));
        assert_eq!(on_interrupt(&service), Interrupt::CancelSweep);
        // Release the read that may be in flight.
        tx.send(()).unwrap();

        assert_eq!(service.wait().unwrap().state, SweepState::Aborted);
        assert_eq!(on_interrupt(&service), Interrupt::Exit);
    }
}
