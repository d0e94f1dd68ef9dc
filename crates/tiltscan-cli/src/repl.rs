//! REPL – Read-Eval-Print Loop for the tiltscan interactive shell.
//!
//! Supported slash-commands:
//!   /help                 – show this list
//!   /scan                 – run one sweep and reconstruct it
//!   /status               – progress of the current or last sweep
//!   /export [dir]         – write the last scan's cloud, mesh and height map
//!   /remesh <csv> [dir]   – rebuild mesh and height map from a saved cloud
//!   /serve                – start the HTTP cockpit in the background
//!   /settings             – interactively edit `~/.tiltscan/config.toml`
//!   /quit | /exit         – gracefully exit the CLI

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tiltscan_cockpit::CockpitServer;
use tiltscan_perception::cloud_io;
use tiltscan_runtime::export::{self, CLOUD_FILE, GRID_FILE, MESH_FILE};
use tiltscan_runtime::{ScanService, ScanSession, reconstruct};
use tiltscan_types::{ReconstructionConfig, StartOutcome, SweepConfig, SweepState};
use tracing::error;

use crate::config::{self, Backend, Config};

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command<'a> {
    Help,
    Scan,
    Status,
    Export(Option<&'a str>),
    Remesh { csv: &'a str, dir: Option<&'a str> },
    Serve,
    Settings,
    Quit,
    /// Known command with bad arguments.
    Usage(&'static str),
    Unknown(&'a str),
}

pub fn parse_command(line: &str) -> Command<'_> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Command::Unknown(line);
    };
    let args: Vec<&str> = words.collect();
    match (head, args.as_slice()) {
        ("/help", []) => Command::Help,
        ("/scan", []) => Command::Scan,
        ("/status", []) => Command::Status,
        ("/export", []) => Command::Export(None),
        ("/export", [dir]) => Command::Export(Some(*dir)),
        ("/export", _) => Command::Usage("/export [dir]"),
        ("/remesh", [csv]) => Command::Remesh {
            csv: *csv,
            dir: None,
        },
        ("/remesh", [csv, dir]) => Command::Remesh {
            csv: *csv,
            dir: Some(*dir),
        },
        ("/remesh", _) => Command::Usage("/remesh <csv> [dir]"),
        ("/serve", []) => Command::Serve,
        ("/settings", []) => Command::Settings,
        ("/quit" | "/exit", []) => Command::Quit,
        _ => Command::Unknown(head),
    }
}

/// Interactive session state.
pub struct Shell {
    service: ScanService,
    config: Config,
    cockpit: Option<JoinHandle<()>>,
}

impl Shell {
    pub fn new(service: ScanService, config: Config) -> Self {
        Self {
            service,
            config,
            cockpit: None,
        }
    }
}

/// Entry point for the interactive REPL.  Returns on `/quit` or end of input.
pub fn run(mut shell: Shell) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("{}: {}", "Cannot open terminal".red(), e);
            return;
        }
    };
    let prompt = format!("{} ", "tiltscan>".bold().cyan());

    loop {
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("  Type {} to exit.", "/quit".bold());
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(cmd);

        match parse_command(cmd) {
            Command::Help => cmd_help(),
            Command::Scan => {
                run_scan(&shell.service, shell.config.sweep.clone());
            }
            Command::Status => cmd_status(&shell.service),
            Command::Export(dir) => {
                let dir = dir.map_or_else(|| shell.config.output_dir.clone(), PathBuf::from);
                export_all(&shell.service, &dir);
            }
            Command::Remesh { csv, dir } => {
                let dir = dir.map_or_else(|| shell.config.output_dir.clone(), PathBuf::from);
                cmd_remesh(Path::new(csv), &dir, &shell.config.reconstruction);
            }
            Command::Serve => cmd_serve(&mut shell),
            Command::Settings => cmd_settings(&mut rl, &mut shell.config),
            Command::Quit => {
                if shell.service.cancel() {
                    println!("  Cancelling the active sweep …");
                    shell.service.wait();
                }
                println!("{}", "Goodbye.".green());
                break;
            }
            Command::Usage(usage) => {
                println!("{} {}", "Usage:".yellow(), usage.bold());
            }
            Command::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared with the non-interactive modes
// ─────────────────────────────────────────────────────────────────────────────

/// Start a sweep and block until it finishes, drawing a progress line.
///
/// Returns the finished session, or `None` when the sweep did not start.
pub fn run_scan(service: &ScanService, sweep: SweepConfig) -> Option<Arc<ScanSession>> {
    match service.start_sweep(sweep) {
        Ok(StartOutcome::Accepted(id)) => {
            println!("  Sweep {} started. Ctrl-C cancels.", id.to_string().dimmed());
        }
        Ok(StartOutcome::Busy) => {
            println!("{}", "  A sweep is already running.".yellow());
            return None;
        }
        Err(e) => {
            println!("{}: {}", "Cannot start sweep".red(), e);
            return None;
        }
    }

    let mut stdout = io::stdout();
    while service.is_running() {
        let p = service.progress();
        print!(
            "\r  [{:>3}%] {}/{} poses, {} skipped",
            p.percent(),
            p.completed,
            p.total,
            p.skipped
        );
        stdout.flush().ok();
        thread::sleep(Duration::from_millis(200));
    }
    println!();

    let session = service.wait();
    if let Some(session) = &session {
        print_session(session);
    }
    session
}

/// Write cloud, mesh and height map of the latest session into `dir`.
///
/// Returns `true` when every file was written.
pub fn export_all(service: &ScanService, dir: &Path) -> bool {
    if service.latest().is_none() {
        println!("  No scan yet. Run {} first.", "/scan".bold().cyan());
        return false;
    }
    if let Err(e) = fs::create_dir_all(dir) {
        println!("{} {}: {}", "Cannot create".red(), dir.display(), e);
        return false;
    }

    let results = [
        (CLOUD_FILE, service.export_point_cloud(&dir.join(CLOUD_FILE))),
        (MESH_FILE, service.export_mesh(&dir.join(MESH_FILE))),
        (GRID_FILE, service.export_height_grid(&dir.join(GRID_FILE))),
    ];
    let mut all_ok = true;
    for (name, result) in results {
        let path = dir.join(name);
        match result {
            Ok(()) => println!("  {} {}", "✓".green().bold(), path.display()),
            Err(e) => {
                all_ok = false;
                println!("  {} {}: {}", "✗".red().bold(), path.display(), e);
            }
        }
    }
    all_ok
}

/// Rebuild mesh and height map from a point-cloud CSV written by an
/// earlier export.  Returns the number of mesh triangles.
pub fn remesh(csv: &Path, dir: &Path, cfg: &ReconstructionConfig) -> Result<usize, String> {
    let file = File::open(csv).map_err(|e| format!("Failed to open {}: {}", csv.display(), e))?;
    let cloud = cloud_io::read_csv(BufReader::new(file))
        .map_err(|e| format!("Failed to read {}: {}", csv.display(), e))?;
    let reconstruction = reconstruct(&cloud, cfg).map_err(|e| e.to_string())?;

    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
    export::export_mesh(&reconstruction.mesh, &cfg.solid_name, &dir.join(MESH_FILE))
        .map_err(|e| e.to_string())?;
    export::export_height_grid(&reconstruction.grid, &dir.join(GRID_FILE))
        .map_err(|e| e.to_string())?;
    Ok(reconstruction.mesh.len())
}

fn print_session(session: &ScanSession) {
    let state = match session.state {
        SweepState::Completed => "completed".green().bold(),
        SweepState::Aborted => "aborted".yellow().bold(),
        other => format!("{other:?}").to_lowercase().red().bold(),
    };
    let elapsed = session.finished_at - session.started_at;
    println!(
        "  Sweep {} in {:.1}s: {} samples, {} skipped",
        state,
        elapsed.num_milliseconds() as f64 / 1000.0,
        session.samples.len(),
        session.skipped
    );
    match (&session.reconstruction, &session.error) {
        (Some(rec), _) => println!(
            "  Mesh: {} triangles over a {}×{} grid",
            rec.mesh.len().to_string().bold(),
            rec.grid.width,
            rec.grid.height
        ),
        (None, Some(e)) => println!("  {}: {}", "No mesh".yellow(), e),
        (None, None) => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "tiltscan Commands".bold().underline());
    println!("  {}                – run one sweep and reconstruct it", "/scan".bold().cyan());
    println!("  {}              – sweep progress and last result", "/status".bold().cyan());
    println!("  {}        – write cloud, mesh and height map", "/export [dir]".bold().cyan());
    println!("  {}  – rebuild the mesh from a saved cloud", "/remesh <csv> [dir]".bold().cyan());
    println!("  {}               – start the HTTP cockpit", "/serve".bold().cyan());
    println!("  {}            – edit ~/.tiltscan/config.toml", "/settings".bold().cyan());
    println!("  {}         – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(service: &ScanService) {
    let p = service.progress();
    println!("{}", "Scan Status".bold().underline());
    println!(
        "  State    : {}{}",
        format!("{:?}", p.state).to_lowercase().yellow(),
        if p.running { " (running)" } else { "" }
    );
    println!(
        "  Progress : {}% ({}/{} poses, {} skipped)",
        p.percent(),
        p.completed,
        p.total,
        p.skipped
    );
    match service.latest() {
        Some(session) => print_session(&session),
        None => println!("  {}", "No finished scan yet.".dimmed()),
    }
}

fn cmd_remesh(csv: &Path, dir: &Path, cfg: &ReconstructionConfig) {
    match remesh(csv, dir, cfg) {
        Ok(triangles) => println!(
            "  {} {} triangles written to {}",
            "✓".green().bold(),
            triangles,
            dir.join(MESH_FILE).display()
        ),
        Err(e) => println!("{}: {}", "Remesh failed".red(), e),
    }
}

fn cmd_serve(shell: &mut Shell) {
    if shell.cockpit.as_ref().is_some_and(|h| !h.is_finished()) {
        println!("  Cockpit already serving on port {}.", shell.config.cockpit_port);
        return;
    }

    let service = shell.service.clone();
    let sweep = shell.config.sweep.clone();
    let port = shell.config.cockpit_port;
    let spawned = thread::Builder::new()
        .name("tiltscan-cockpit".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "cannot start cockpit runtime");
                    return;
                }
            };
            if let Err(e) = rt.block_on(CockpitServer::new(service, sweep).with_port(port).run()) {
                error!(error = %e, "cockpit stopped");
            }
        });

    match spawned {
        Ok(handle) => {
            shell.cockpit = Some(handle);
            println!(
                "  Cockpit serving on {}",
                format!("http://localhost:{port}/").bold()
            );
        }
        Err(e) => println!("{}: {}", "Cannot start cockpit".red(), e),
    }
}

fn cmd_settings(rl: &mut DefaultEditor, cfg: &mut Config) {
    println!("{}", "Settings Editor".bold().underline());
    println!("  {}", "Edit a value or press Enter to keep it.".dimmed());

    cfg.hardware.backend = prompt(rl, "Backend (sim/serial)", cfg.hardware.backend);
    if cfg.hardware.backend == Backend::Serial {
        cfg.hardware.serial_port = prompt(rl, "Serial port", cfg.hardware.serial_port.clone());
    }
    cfg.cockpit_port = prompt(rl, "Cockpit port", cfg.cockpit_port);
    let output_dir = prompt(rl, "Output dir", cfg.output_dir.display().to_string());
    cfg.output_dir = PathBuf::from(output_dir);

    cfg.sweep.pan_min = prompt(rl, "Pan min (deg)", cfg.sweep.pan_min);
    cfg.sweep.pan_max = prompt(rl, "Pan max (deg)", cfg.sweep.pan_max);
    cfg.sweep.pan_step = prompt(rl, "Pan step (deg)", cfg.sweep.pan_step);
    cfg.sweep.tilt_min = prompt(rl, "Tilt min (deg)", cfg.sweep.tilt_min);
    cfg.sweep.tilt_max = prompt(rl, "Tilt max (deg)", cfg.sweep.tilt_max);
    cfg.sweep.tilt_step = prompt(rl, "Tilt step (deg)", cfg.sweep.tilt_step);
    cfg.sweep.sensor_height_cm = prompt(rl, "Sensor height (cm)", cfg.sweep.sensor_height_cm);
    if let Err(e) = cfg.sweep.validate() {
        println!("  {} {}", "Warning:".yellow(), e);
    }

    cfg.reconstruction.cell_size_cm = prompt(rl, "Cell size (cm)", cfg.reconstruction.cell_size_cm);
    cfg.reconstruction.building_threshold_cm = prompt(
        rl,
        "Building threshold (cm)",
        cfg.reconstruction.building_threshold_cm,
    );

    match config::save(cfg) {
        Ok(()) => {
            println!(
                "{} {}",
                "✓ Settings saved to".green(),
                config::config_path().display().to_string().bold()
            );
            println!(
                "  {}",
                "Hardware, sampler and reconstruction changes take effect on restart.".dimmed()
            );
        }
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt for a value pre-filled with `current`.  Keeps `current` on empty
/// input, unparseable input or a read error.
fn prompt<T>(rl: &mut DefaultEditor, label: &str, current: T) -> T
where
    T: FromStr + Display,
{
    let shown = current.to_string();
    let raw = match rl.readline_with_initial(&format!("  {label:<24}: "), (&shown, "")) {
        Ok(raw) => raw,
        Err(_) => return current,
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return current;
    }
    match raw.parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            println!(
                "  {} '{}' is not valid here, keeping {}",
                "Warning:".yellow(),
                raw,
                shown
            );
            current
        }
    }
}
