use anyhow::bail;
use clap::Parser;
use win_disktopo::Target;

#[cfg(windows)]
mod report;

/// Show which physical disk, adapter and partition table a path lives on.
#[derive(Debug, Parser)]
#[command(name = "disktopo", version)]
struct Cli {
    /// Drive letter, volume path, device path or physical disk ordinal
    #[arg(required_unless_present = "list", conflicts_with = "list")]
    target: Option<String>,

    /// Enumerate all physical disks instead
    #[arg(long)]
    list: bool,

    /// Query as if elevated, whatever the process token says
    #[arg(long, conflicts_with = "not_elevated")]
    elevated: bool,

    /// Query as if not elevated
    #[arg(long)]
    not_elevated: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// How many times a query buffer may double
    #[arg(long)]
    max_doublings: Option<u32>,

    /// Highest disk ordinal tried by --list
    #[arg(long)]
    max_disks: Option<u32>,

    /// Log every control request
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn elevation(&self) -> Option<bool> {
        match (self.elevated, self.not_elevated) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    fn target(&self) -> anyhow::Result<Target> {
        let Some(raw) = self.target.as_deref() else {
            bail!("no target given");
        };
        Ok(match raw.parse::<u32>() {
            Ok(ordinal) => Target::Ordinal(ordinal),
            Err(_) => Target::from(raw),
        })
    }
}

#[cfg(windows)]
fn run(cli: &Cli) -> anyhow::Result<()> {
    use anyhow::Context;
    use win_disktopo::{Lookup, ResolverConfig, StorageResolver, Win32Opener};

    let mut config = ResolverConfig::default();
    if let Some(max) = cli.max_doublings {
        config.max_buffer_doublings = max;
    }
    if let Some(max) = cli.max_disks {
        config.max_disk_ordinal = max;
    }
    let resolver = StorageResolver::with_config(Win32Opener, config);

    if cli.list {
        let disks = resolver
            .list_disks(cli.elevation())
            .context("Failed to list disks")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&disks)?);
        } else {
            report::print_disks(&disks);
        }
        return Ok(());
    }

    let target = cli.target()?;
    let info = match resolver
        .resolve(target.clone(), cli.elevation())
        .with_context(|| format!("Failed to resolve {target:?}"))?
    {
        Lookup::Resolved(info) => info,
        Lookup::NotFound => bail!("{target:?}: no such disk"),
        Lookup::Unsupported => bail!("{target:?}: device does not report a disk number"),
        Lookup::Inconsistent => bail!("{target:?}: disk changed while it was being queried"),
    };
    let extents = resolver
        .disk_extents(target.clone())
        .with_context(|| format!("Failed to read extents of {target:?}"))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        report::print_info(&info);
        report::print_extents(&extents);
    }
    Ok(())
}

#[cfg(not(windows))]
fn run(cli: &Cli) -> anyhow::Result<()> {
    if !cli.list {
        cli.target()?;
    }
    bail!("disktopo only runs on Windows")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
    run(&cli)
}
