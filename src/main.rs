//! listfs - Present a list of existing filesystem objects as a read-only mount
//!
//! Usage:
//!   listfs mount <list> <mount_point>   - Mount the list (`-` reads stdin)
//!   listfs check <list>                 - Show the tree a list would produce
//!   listfs unmount <mount_point>        - Unmount a listfs mount

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use listfs::{
    config::{Config, FS_SUBTYPE},
    fs::ListFs,
    overlay::Overlay,
    trie::{ListSource, LoadReport, RejectReason},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "listfs")]
#[command(author = "listfs Contributors")]
#[command(version)]
#[command(about = "Mount a list of existing paths as a read-only directory tree")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/listfs/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the overlay (runs in the foreground until unmounted)
    Mount {
        /// File listing one path per line, or `-` for stdin
        list: PathBuf,

        /// Mount point directory
        mount_point: PathBuf,

        #[command(flatten)]
        overlay: OverlayArgs,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,

        /// Allow root to access the mount
        #[arg(long)]
        allow_root: bool,

        /// Unmount when the process exits
        #[arg(long)]
        auto_unmount: bool,

        /// Extra mount options (comma-separated, repeatable)
        #[arg(short = 'o', value_delimiter = ',')]
        options: Vec<String>,
    },

    /// Load a list and print the resulting tree without mounting
    Check {
        /// File listing one path per line, or `-` for stdin
        list: PathBuf,

        #[command(flatten)]
        overlay: OverlayArgs,
    },

    /// Unmount the filesystem
    Unmount {
        /// Mount point to unmount
        mount_point: PathBuf,
    },
}

#[derive(Args)]
struct OverlayArgs {
    /// Real directory the listed paths are relative to
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Report attributes of symlink targets instead of the links
    #[arg(long)]
    follow_symlinks: bool,
}

impl OverlayArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if self.follow_symlinks {
            config.follow_symlinks = true;
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    let config_path = expand_tilde(&cli.config);

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Mount {
            list,
            mount_point,
            overlay,
            allow_other,
            allow_root,
            auto_unmount,
            options,
        } => {
            let mut config = Config::load_or_default(config_path)?;
            overlay.apply(&mut config);
            config.mount.allow_other |= allow_other;
            config.mount.allow_root |= allow_root;
            config.mount.auto_unmount |= auto_unmount;
            config.mount.options.extend(options);
            config.validate()?;

            cmd_mount(&config, &list, &mount_point)
        }

        Commands::Check { list, overlay } => {
            let mut config = Config::load_or_default(config_path)?;
            overlay.apply(&mut config);
            cmd_check(&config, &list)
        }

        Commands::Unmount { mount_point } => cmd_unmount(&mount_point),
    }
}

fn cmd_mount(config: &Config, list: &Path, mount_point: &Path) -> anyhow::Result<()> {
    let source = ListSource::from_arg(list);
    let (overlay, report) = Overlay::load(config, &source)
        .with_context(|| format!("Failed to load list {}", source.display_name()))?;
    log_report(&report);

    let fs = ListFs::new(Arc::new(overlay), config);

    let fsname = config
        .mount
        .fsname
        .clone()
        .unwrap_or_else(|| source.display_name());

    let mut options = vec![
        fuser::MountOption::RO,
        fuser::MountOption::FSName(fsname),
        fuser::MountOption::Subtype(FS_SUBTYPE.to_string()),
    ];

    if config.mount.allow_other {
        options.push(fuser::MountOption::AllowOther);
    }
    if config.mount.allow_root {
        options.push(fuser::MountOption::AllowRoot);
    }
    if config.mount.auto_unmount {
        options.push(fuser::MountOption::AutoUnmount);
    }
    for option in &config.mount.options {
        let option = option.trim();
        if !option.is_empty() {
            options.push(fuser::MountOption::CUSTOM(option.to_string()));
        }
    }

    info!("Mounting at {:?}", mount_point);
    fuser::mount2(fs, mount_point, &options)
        .with_context(|| format!("Failed to mount at {}", mount_point.display()))?;

    info!("Unmounted {:?}", mount_point);
    Ok(())
}

fn cmd_check(config: &Config, list: &Path) -> anyhow::Result<()> {
    let source = ListSource::from_arg(list);
    let (overlay, report) = Overlay::load(config, &source)
        .with_context(|| format!("Failed to load list {}", source.display_name()))?;

    println!("Root: {}", overlay.root().display());
    println!(
        "Entries: {} accepted, {} rejected, {} blank",
        report.accepted,
        report.rejected.len(),
        report.blank
    );
    println!();
    print!("{}", overlay.trie().render());

    if !report.rejected.is_empty() {
        println!();
        println!("Rejected:");
        for entry in &report.rejected {
            println!(
                "  line {}: {} ({})",
                entry.line,
                entry.path.display(),
                reason_text(entry.reason)
            );
        }
    }

    Ok(())
}

fn cmd_unmount(mount_point: &Path) -> anyhow::Result<()> {
    info!("Unmounting {:?}...", mount_point);

    #[cfg(target_os = "linux")]
    let output = std::process::Command::new("fusermount")
        .arg("-u")
        .arg(mount_point)
        .output()?;

    #[cfg(not(target_os = "linux"))]
    let output = std::process::Command::new("umount")
        .arg(mount_point)
        .output()?;

    if output.status.success() {
        info!("Unmounted successfully");
        Ok(())
    } else {
        anyhow::bail!(
            "Failed to unmount: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    }
}

fn log_report(report: &LoadReport) {
    info!(
        "List loaded: {} accepted, {} rejected, {} blank lines",
        report.accepted,
        report.rejected.len(),
        report.blank
    );
    if report.accepted == 0 {
        warn!("No entries accepted; the mount will be empty");
    }
}

fn reason_text(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::Unresolvable => "cannot resolve",
        RejectReason::OutsideRoot => "outside root",
    }
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
