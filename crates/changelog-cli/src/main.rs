mod cmd_compile;
mod cmd_validate;
mod source;

use anyhow::Result;
use changelog_xml::XmlConfig;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "changelog")]
#[command(about = "Compile change-log trees into XML change-log files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a change-log tree as XML, one file per included change-log
    Compile {
        #[command(flatten)]
        source: SourceArgs,

        /// Output directory (required unless --single-file prints to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Flatten every included change-log into one file
        #[arg(long)]
        single_file: bool,

        #[command(flatten)]
        xml: XmlArgs,
    },
    /// Check a change-log tree and report anomalies
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Change-log tree (JSON, as produced by a change-log parser)
    #[arg(short, long)]
    src: PathBuf,

    /// Directories searched for --src when it is not found as given,
    /// separated like PATH
    #[arg(long)]
    classpath: Option<String>,
}

#[derive(Args, Debug)]
struct XmlArgs {
    /// Encoding named in the XML declaration
    #[arg(long, default_value = "UTF-8")]
    encoding: String,

    /// Write compact XML
    #[arg(long)]
    no_indent: bool,

    /// Omit the XML declaration
    #[arg(long)]
    no_xml_declaration: bool,
}

impl XmlArgs {
    fn config(&self) -> XmlConfig {
        XmlConfig::default()
            .with_encoding(self.encoding.clone())
            .with_indent(if self.no_indent { None } else { Some(4) })
            .with_xml_declaration(!self.no_xml_declaration)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .filter_level(cli.verbose.log_level_filter())
        .target(env_logger::fmt::Target::Stderr)
        .init();

    match cli.command {
        Commands::Compile {
            source,
            out,
            single_file,
            xml,
        } => cmd_compile::run(
            source.src,
            source.classpath.as_deref(),
            out,
            single_file,
            xml.config(),
        ),
        Commands::Validate { source } => cmd_validate::run(source.src, source.classpath.as_deref()),
    }
}
