use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "atlas",
    about = "Atlas — replicated directory of content-addressed deployments",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Server to talk to (ignored by `serve`).
    #[arg(long, global = true, default_value = "http://127.0.0.1:7600")]
    pub server: String,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an Atlas server
    Serve(ServeArgs),
    /// Show a server's status
    Status(StatusArgs),
    /// Deploy an entity with its content files
    Deploy(DeployArgs),
    /// Show active pointers, or resolve one
    Active(ActiveArgs),
    /// Show deployment history, newest first
    History(HistoryArgs),
    /// Show one entity and its audit records
    Show(ShowArgs),
    /// Show the audit records of an entity
    Audit(AuditArgs),
    /// Fetch content bytes by hash
    Cat(CatArgs),
    /// List the servers in the peer directory
    Servers(ServersArgs),
    /// Run a sync cycle now
    Sync(SyncArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file. Flags below override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<String>,
    /// Server name, unique across the cluster.
    #[arg(long)]
    pub name: Option<String>,
    /// Journal file for a durable node.
    #[arg(long)]
    pub journal: Option<PathBuf>,
    /// Seed peer base URL; repeatable.
    #[arg(long = "peer")]
    pub peers: Vec<String>,
}

#[derive(Args)]
pub struct StatusArgs {}

#[derive(Args)]
pub struct DeployArgs {
    /// Entity kind, e.g. `scene`.
    #[arg(short, long)]
    pub kind: String,
    /// Pointer the entity claims; repeatable, at least one.
    #[arg(short, long = "pointer", required = true)]
    pub pointers: Vec<String>,
    /// Content files as `logical-name=path`, or bare paths named after
    /// the file.
    pub files: Vec<String>,
    /// Author metadata as inline JSON.
    #[arg(short, long)]
    pub metadata: Option<String>,
    /// Author timestamp in epoch milliseconds; defaults to now.
    #[arg(long)]
    pub timestamp: Option<u64>,
    /// Proof link as `signer=signature`; repeatable.
    #[arg(long = "auth")]
    pub auth: Vec<String>,
}

#[derive(Args)]
pub struct ActiveArgs {
    pub kind: Option<String>,
    #[arg(short, long)]
    pub pointer: Option<String>,
}

#[derive(Args)]
pub struct HistoryArgs {
    /// Inclusive lower bound, epoch milliseconds.
    #[arg(long)]
    pub from: Option<u64>,
    /// Inclusive upper bound, epoch milliseconds.
    #[arg(long)]
    pub to: Option<u64>,
    #[arg(long)]
    pub offset: Option<usize>,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Entity id (hex).
    pub id: String,
}

#[derive(Args)]
pub struct AuditArgs {
    /// Entity id (hex).
    pub id: String,
}

#[derive(Args)]
pub struct CatArgs {
    /// Content hash (hex).
    pub hash: String,
    /// Write to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ServersArgs {}

#[derive(Args)]
pub struct SyncArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["atlas", "serve", "--bind", "0.0.0.0:8100"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("0.0.0.0:8100".into()));
            assert!(args.config.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_serve_with_peers() {
        let cli = Cli::try_parse_from([
            "atlas",
            "serve",
            "--name",
            "alpha",
            "--peer",
            "http://beta:7600",
            "--peer",
            "http://gamma:7600",
        ])
        .unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.name, Some("alpha".into()));
            assert_eq!(args.peers.len(), 2);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_deploy() {
        let cli = Cli::try_parse_from([
            "atlas",
            "deploy",
            "--kind",
            "scene",
            "--pointer",
            "12,4",
            "--pointer",
            "12,5",
            "scene.dat=./scene.dat",
        ])
        .unwrap();
        if let Command::Deploy(args) = cli.command {
            assert_eq!(args.kind, "scene");
            assert_eq!(args.pointers, vec!["12,4", "12,5"]);
            assert_eq!(args.files, vec!["scene.dat=./scene.dat"]);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn deploy_requires_a_pointer() {
        assert!(Cli::try_parse_from(["atlas", "deploy", "--kind", "scene"]).is_err());
    }

    #[test]
    fn parse_active_with_pointer() {
        let cli = Cli::try_parse_from(["atlas", "active", "scene", "--pointer", "12,4"]).unwrap();
        if let Command::Active(args) = cli.command {
            assert_eq!(args.kind, Some("scene".into()));
            assert_eq!(args.pointer, Some("12,4".into()));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_history_window() {
        let cli =
            Cli::try_parse_from(["atlas", "history", "--from", "1000", "-n", "5"]).unwrap();
        if let Command::History(args) = cli.command {
            assert_eq!(args.from, Some(1000));
            assert_eq!(args.limit, 5);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_cat_to_file() {
        let cli = Cli::try_parse_from(["atlas", "cat", "abc123", "-o", "out.bin"]).unwrap();
        if let Command::Cat(args) = cli.command {
            assert_eq!(args.hash, "abc123");
            assert_eq!(args.output, Some("out.bin".into()));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_server_override() {
        let cli = Cli::try_parse_from(["atlas", "--server", "http://remote:7600", "status"])
            .unwrap();
        assert_eq!(cli.server, "http://remote:7600");
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["atlas", "--format", "json", "servers"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
