use clap::Parser;
use std::path::PathBuf;

pub mod bootstrap;
pub mod dispatcher;
pub mod handlers;

/// Builds the color-aware help text from the locale template.
fn build_help_string() -> &'static str {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();

    let template = t!("cli.help.template");

    let title = if use_colors { "\x1b[1;33m" } else { "" }; // Bold Yellow
    let hl = if use_colors { "\x1b[1;36m" } else { "" }; // Bold Cyan
    let cmd = if use_colors { "\x1b[36m" } else { "" }; // Cyan
    let dim = if use_colors { "\x1b[2m" } else { "" };
    let reset = if use_colors { "\x1b[0m" } else { "" };

    let formatted_string = template
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset);

    Box::leak(formatted_string.into_boxed_str())
}

/// jsh: an embeddable scripting shell.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Run this code instead of a script file.
    #[arg(short = 'C', value_name = "CODE")]
    pub code: Option<String>,

    /// Resume from a transport file written by a parent jsh.
    #[arg(short = 'S', value_name = "FILE", hide = true)]
    pub resume: Option<PathBuf>,

    /// Inherited descriptor holding the key of the transport file.
    #[arg(short = 'K', value_name = "FD", hide = true, requires = "resume")]
    pub key_fd: Option<i32>,

    /// Mount a host directory: `MOUNTPOINT=DIR`. Repeatable.
    #[arg(short = 'v', value_name = "MOUNTPOINT=DIR")]
    pub mounts: Vec<String>,

    /// Set an environment variable: `NAME=VALUE`. Repeatable.
    #[arg(short = 'e', value_name = "NAME=VALUE")]
    pub env: Vec<String>,

    /// The script to run and its arguments. Everything after the script
    /// belongs to the script.
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}
