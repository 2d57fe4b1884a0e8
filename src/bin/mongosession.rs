use clap::{Parser, Subcommand};
use mongosession::cli::{self as prog_cli, Command, parse_pair, parse_sort};
use mongosession::{DbQueryParams, QueryOperator, Session, SessionConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mongosession", version, about = "Typed document session CLI", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). If omitted, the default locations are searched.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Connection string; takes precedence over config/env.")]
    uri: Option<String>,
    #[arg(long, help = "Database name; takes precedence over config/env.")]
    db: Option<String>,
    #[arg(long, help = "Log level: error|warn|info|debug|trace")]
    log_level: Option<String>,
    #[arg(long, help = "Use a process-local in-memory store instead of a server")]
    memory: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(subcommand, about = "User collection operations")]
    Users(UserCommands),
    #[command(name = "ensure-ttl", about = "Create the six-hour TTL index on Date for the User collection")]
    EnsureTtl,
    #[command(name = "ensure-text-index", about = "Create a text index on the User collection")]
    EnsureTextIndex {
        #[arg(required = true, help = "Fields to index, e.g. Name Email")]
        fields: Vec<String>,
    },
    #[command(about = "Print operation counters for this process")]
    Metrics,
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    #[command(about = "Insert a user; prints it with its new id")]
    Add { name: String, email: String },
    #[command(about = "Save a user, inserting when the id does not exist")]
    Edit { id: String, name: String, email: String },
    #[command(about = "Print one user by id")]
    Get { id: String },
    #[command(about = "Print every user as NDJSON")]
    List,
    #[command(about = "Delete a user by id")]
    Delete { id: String },
    #[command(about = "Regex search on Name")]
    Search { pattern: String },
    #[command(about = "Case-insensitive substring search on Name, ordered by name")]
    Find { needle: String },
    #[command(about = "Full-text search; needs a text index")]
    Text {
        search: String,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    #[command(about = "One page of a regex search")]
    Page {
        #[arg(long = "where", value_name = "FIELD=REGEX", help = "Search predicate; repeatable")]
        predicates: Vec<String>,
        #[arg(long, help = "Join predicates with OR instead of AND")]
        or: bool,
        #[arg(long, help = "Sort spec comma-separated; -Email,+Name")]
        sort: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = 50)]
        count: u64,
    },
    #[command(about = "Count users, optionally matching predicates")]
    Count {
        #[arg(long = "where", value_name = "FIELD=REGEX")]
        predicates: Vec<String>,
        #[arg(long)]
        or: bool,
    },
    #[command(about = "Insert generated users")]
    Seed {
        #[arg(default_value_t = 10)]
        count: usize,
    },
    #[command(about = "Drop the User collection")]
    Drop,
}

fn query_params(predicates: &[String], or: bool) -> Result<DbQueryParams, Box<dyn std::error::Error>> {
    let mut params = DbQueryParams::new();
    for p in predicates {
        params.query_params.push(parse_pair(p)?);
    }
    params.operator = if or { QueryOperator::Or } else { QueryOperator::And };
    Ok(params)
}

fn to_command(cmd: Commands) -> Result<Command, Box<dyn std::error::Error>> {
    Ok(match cmd {
        Commands::EnsureTtl => Command::EnsureTtl,
        Commands::EnsureTextIndex { fields } => Command::EnsureTextIndex { fields },
        Commands::Metrics => Command::Metrics,
        Commands::Users(u) => match u {
            UserCommands::Add { name, email } => Command::UserAdd { name, email },
            UserCommands::Edit { id, name, email } => Command::UserEdit { id, name, email },
            UserCommands::Get { id } => Command::UserGet { id },
            UserCommands::List => Command::UserList,
            UserCommands::Delete { id } => Command::UserDelete { id },
            UserCommands::Search { pattern } => Command::UserSearch { pattern },
            UserCommands::Find { needle } => Command::UserFind { needle },
            UserCommands::Text { search, skip, limit } => Command::UserTextSearch { search, skip, limit },
            UserCommands::Page { predicates, or, sort, skip, count } => {
                let mut params = query_params(&predicates, or)?;
                params.sort_params = sort.as_deref().map(parse_sort).unwrap_or_default();
                params.skip_records = skip;
                params.count = count;
                Command::UserPage { params }
            }
            UserCommands::Count { predicates, or } => Command::UserCount {
                params: if predicates.is_empty() { None } else { Some(query_params(&predicates, or)?) },
            },
            UserCommands::Seed { count } => Command::UserSeed { count },
            UserCommands::Drop => Command::UserDrop,
        },
    })
}

fn main() {
    let cli = Cli::parse();
    let overrides = SessionConfig {
        connection_string: cli.uri.clone(),
        db_name: cli.db.clone(),
        log_level: cli.log_level.clone(),
        ..SessionConfig::default()
    };
    let cfg = match SessionConfig::load(cli.config.as_deref(), overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = mongosession::init(&cfg) {
        eprintln!("warning: logging disabled: {e}");
    }
    let session = if cli.memory { Ok(Session::in_memory()) } else { Session::from_config(&cfg) };
    let r = session.map_err(Into::into).and_then(|session| {
        let cmd = to_command(cli.command)?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        prog_cli::run(&session, cmd, &mut out)
    });
    if let Err(e) = r {
        log::error!("command failed: {e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
