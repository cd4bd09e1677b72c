use clap::{Args, Parser, Subcommand};
use odmlite::cli::{self as prog_cli, Command, Source};
use odmlite::config::OdmConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "odmlite", version, about = "Query and validate NDJSON data against an odmlite schema", long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "Path to a config file (TOML). Defaults to $ODMLITE_CONFIG or ./odmlite.toml.")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SourceArgs {
    #[arg(long, help = "Schema declaration (JSON)")]
    schema: PathBuf,
    #[arg(long, help = "Documents, one JSON object per line")]
    data: PathBuf,
}

impl From<SourceArgs> for Source {
    fn from(a: SourceArgs) -> Self {
        Self { schema: a.schema, data: a.data }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run a query and print matching documents as NDJSON")]
    Query {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, help = "Filter document, e.g. '{\"hits\": {\"$gte\": 18}}'")]
        filter: Option<String>,
        #[arg(long, help = "Sort spec: '-hits name' or '{\"hits\": -1}'")]
        sort: Option<String>,
        #[arg(long)]
        skip: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, help = "Projection: 'a b' keeps fields, '-c' drops them")]
        select: Option<String>,
        #[arg(long, help = "Print stored values only, without virtuals")]
        lean: bool,
        #[arg(long, help = "Print the query plan instead of running it")]
        explain: bool,
    },
    #[command(about = "Validate every line of the data file against the schema")]
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    let cfg = match OdmConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = odmlite::logger::configure_from(&cfg) {
        eprintln!("warning: logging disabled: {e}");
    }
    let cmd = match cli.command {
        Commands::Query { source, filter, sort, skip, limit, select, lean, explain } => Command::Query {
            source: source.into(),
            filter_json: filter,
            sort,
            skip,
            limit,
            select,
            lean,
            explain,
        },
        Commands::Validate { source } => Command::Validate { source: source.into() },
    };
    let stdout = std::io::stdout();
    match prog_cli::run(&cfg, cmd, &mut stdout.lock()) {
        Ok(report) if report.failed > 0 => {
            eprintln!("{} line(s) rejected", report.failed);
            std::process::exit(1);
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    }
}
