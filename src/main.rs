use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usbgx::gadget::{Gadget, HostFs};
use usbgx::{GadgetScheme, State, StateOptions};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Verbose,
    Debug,
    Trace,
}

/// usbgx command line arguments
#[derive(Parser, Debug)]
#[command(name = "usbgx")]
#[command(version, about = "Manage USB gadgets through configfs", long_about = None)]
struct CliArgs {
    /// configfs mount point (default: $USBGX_CONFIGFS or /sys/kernel/config)
    #[arg(long, value_name = "DIR", global = true)]
    configfs: Option<PathBuf>,

    /// UDC class directory (default: $USBGX_UDC_DIR or /sys/class/udc)
    #[arg(long, value_name = "DIR", global = true)]
    udc_dir: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every gadget with its functions, configs and bindings
    Show {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List USB Device Controllers and the gadget bound to each
    Udcs,
    /// Create a gadget from a TOML description
    Apply {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Enable on this UDC (overrides the file)
        #[arg(long, value_name = "NAME")]
        udc: Option<String>,
    },
    /// Bind a gadget to a UDC (first free one when omitted)
    Enable {
        gadget: String,
        #[arg(long, value_name = "NAME")]
        udc: Option<String>,
    },
    /// Unbind a gadget from its UDC
    Disable { gadget: String },
    /// Remove a gadget
    Remove {
        gadget: String,
        /// Also disable it and remove its configs and functions
        #[arg(short = 'r', long)]
        recursive: bool,
    },
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<usbgx::Error>() {
                Some(e) => eprintln!("{}: {}", e.name(), e),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    // Flags take precedence over the environment
    let mut options = StateOptions::from_env();
    if let Some(root) = args.configfs {
        options.configfs_root = root;
    }
    if let Some(dir) = args.udc_dir {
        options.udc_root = dir;
    }
    tracing::debug!(
        "configfs at {}, UDCs at {}",
        options.configfs_root.display(),
        options.udc_root.display()
    );

    let mut state = State::with_options(options, HostFs::new())?;

    match args.command {
        Command::Show { json } => {
            if json {
                let text = serde_json::to_string_pretty(&Snapshot::new(&state))
                    .context("failed to serialize gadget tree")?;
                println!("{}", text);
            } else {
                for gadget in state.gadgets() {
                    print_gadget(gadget);
                }
            }
        }
        Command::Udcs => {
            for udc in state.udcs() {
                match state.udc_owner(udc) {
                    Some(gadget) => println!("{} -> {}", udc, gadget.name()),
                    None => println!("{}", udc),
                }
            }
        }
        Command::Apply { file, udc } => {
            let scheme = GadgetScheme::load(&file)?;
            match scheme.apply(&mut state, udc.as_deref())? {
                Some(udc) => println!("{} enabled on {}", scheme.name, udc),
                None => println!("{} created", scheme.name),
            }
        }
        Command::Enable { gadget, udc } => {
            let udc = state.enable_gadget(&gadget, udc.as_deref())?;
            println!("{} enabled on {}", gadget, udc);
        }
        Command::Disable { gadget } => {
            state.disable_gadget(&gadget)?;
        }
        Command::Remove { gadget, recursive } => {
            state.remove_gadget(&gadget, recursive)?;
        }
    }

    state.release();
    Ok(())
}

fn print_gadget(gadget: &Gadget) {
    println!("{} [{}]", gadget.name(), gadget.udc().unwrap_or("disabled"));
    for lang in gadget.langs() {
        if let Some(strings) = gadget.strings(lang) {
            println!(
                "  strings 0x{:x}: {:?} {:?} {:?}",
                lang, strings.manufacturer, strings.product, strings.serial
            );
        }
    }
    for function in gadget.functions() {
        println!("  function {}", function.id());
    }
    for config in gadget.configs() {
        let attrs = config.attrs();
        println!(
            "  config {} (MaxPower {}, bmAttributes 0x{:x})",
            config.id(),
            attrs.max_power,
            attrs.bm_attributes
        );
        for binding in config.bindings() {
            println!("    {} -> {}", binding.name(), binding.target());
        }
    }
    if let Some(config) = gadget.os_desc_config() {
        println!("  os_desc -> {}", config);
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    gadgets: Vec<&'a Gadget>,
    udcs: Vec<UdcEntry<'a>>,
}

#[derive(Serialize)]
struct UdcEntry<'a> {
    name: &'a str,
    gadget: Option<&'a str>,
}

impl<'a> Snapshot<'a> {
    fn new(state: &'a State) -> Self {
        Self {
            gadgets: state.gadgets().collect(),
            udcs: state
                .udcs()
                .map(|name| UdcEntry {
                    name,
                    gadget: state.udc_owner(name).map(Gadget::name),
                })
                .collect(),
        }
    }
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "usbgx=error",
        LogLevel::Warn => "usbgx=warn",
        LogLevel::Info => "usbgx=info",
        LogLevel::Verbose => "usbgx=debug",
        LogLevel::Debug => "usbgx=debug",
        LogLevel::Trace => "usbgx=trace",
    };

    // RUST_LOG takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
