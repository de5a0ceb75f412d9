use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use siggen::commands::{
    generate_command, list_dialects_command, validate_policy_command, GenerateOptions,
};
use siggen::logging::init_logging;
use siggen_core::Dialect;

/// Detection signature generator.
///
/// This CLI is a thin wrapper around `siggen-core` (exposed in code as `siggen_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "siggen",
    version,
    about = "Turn matched byte regions into ClamAV, YARA or generic signatures",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one signature per policy from a match snapshot.
    ///
    /// Policies are processed in parallel; output keeps the order in which
    /// `--policy` was given. A failing policy does not stop the others, but the
    /// command exits non-zero if any failed.
    Generate {
        /// Generation policy file (YAML or JSON). Repeat for a batch.
        #[arg(long = "policy", required = true)]
        policies: Vec<String>,

        /// Matcher output snapshot (YAML or JSON) holding the items' regions.
        #[arg(long)]
        matches: String,

        /// Output dialect: generic, clamav or yara.
        #[arg(long, default_value = "clamav")]
        dialect: Dialect,

        /// Emit the batch as JSON instead of signature text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Append each publishable signature to this file as a JSON line.
        #[arg(long)]
        out: Option<String>,

        /// Override the largest bounded ClamAV jump.
        #[arg(long)]
        clamav_max_jump: Option<u32>,

        /// Override the largest bounded YARA jump.
        #[arg(long)]
        yara_max_jump: Option<u32>,
    },

    /// Load a policy, validate it and print a summary.
    ValidatePolicy {
        /// Policy file (YAML or JSON).
        #[arg(long)]
        policy: String,
    },

    /// List the supported dialects and their jump limits.
    ListDialects {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    siggen_core::schema::verify_builtin_registries()
        .context("Built-in field identifier tables are inconsistent")?;

    match cli.command {
        Command::Generate {
            policies,
            matches,
            dialect,
            json,
            out,
            clamav_max_jump,
            yara_max_jump,
        } => generate_command(&GenerateOptions {
            policies,
            matches,
            dialect,
            json,
            out,
            clamav_max_jump,
            yara_max_jump,
        })?,
        Command::ValidatePolicy { policy } => validate_policy_command(&policy)?,
        Command::ListDialects { json } => list_dialects_command(json)?,
    }

    Ok(())
}
