use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use eyre::Result as EyreResult;

use crate::defaults;

mod init;
mod run;

use init::InitCommand;
use run::RunCommand;

pub const AFTER_HELP: &str = r"Environment variables:
  BUSTLINK_HOME    Directory for config and data

Examples:
  # Initialize a new node
  $ bustlinkd --home data/ --node-name node1 init

  # Initialize a node that bootstraps from a known peer
  $ bustlinkd --home data/ --node-name node2 init --swarm-port 4102 \
      --boot-nodes /ip4/127.0.0.1/tcp/4101/p2p/12D3KooW...

  # Run a node
  $ bustlinkd --home data/ --node-name node1 run
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = AFTER_HELP)]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Init(InitCommand),
    #[command(alias = "up")]
    Run(RunCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for config and data
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_node_dir())]
    #[arg(env = "BUSTLINK_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,

    /// Name of node
    #[arg(short, long, value_name = "NAME")]
    pub node_name: Utf8PathBuf,
}

impl RootArgs {
    pub fn node_dir(&self) -> Utf8PathBuf {
        self.home.join(&self.node_name)
    }
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Init(init) => init.run(&self.args),
            SubCommands::Run(run) => run.run(&self.args).await,
        }
    }
}
