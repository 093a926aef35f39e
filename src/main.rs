use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use promo_snapshot::registry::{RegistryDump, RegistryName};
use promo_snapshot::{parse_snapshot_tag, Options, Snapshotter};

#[derive(Parser)]
struct Cli {
    /// YAML file with snapshot options; flags override its values.
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// YAML dump of registry contents to read registries from.
    #[arg(short, long)]
    registry_dump: PathBuf,

    /// Output format, csv or yaml.
    #[arg(short, long)]
    output_format: Option<String>,

    /// Registry to snapshot by reading it directly.
    #[arg(long, conflicts_with = "manifest_based_snapshot_of")]
    snapshot: Option<String>,

    /// Registry to snapshot from the promotion edges of the manifests.
    #[arg(long)]
    manifest_based_snapshot_of: Option<String>,

    /// Promoter manifest to include in the snapshot.
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Only include images carrying this tag.
    #[arg(long)]
    snapshot_tag: Option<String>,

    /// Drop untagged children of manifest lists.
    #[arg(long)]
    minimal_snapshot: bool,

    #[arg(long)]
    snapshot_service_account: Option<String>,
}

impl Cli {
    fn options(&self) -> Result<Options> {
        let mut opts = match &self.config_file {
            Some(path) => Options::from_file(path)?,
            None => Options::default(),
        };

        if let Some(format) = &self.output_format {
            opts.output_format = format.clone();
        }
        if let Some(name) = &self.snapshot {
            opts.snapshot = Some(RegistryName::from(name.as_str()));
            opts.manifest_based_snapshot_of = None;
        }
        if let Some(name) = &self.manifest_based_snapshot_of {
            opts.manifest_based_snapshot_of = Some(RegistryName::from(name.as_str()));
            opts.snapshot = None;
        }
        if let Some(path) = &self.manifest {
            opts.manifest = Some(path.clone());
        }
        if let Some(tag) = &self.snapshot_tag {
            opts.snapshot_tag = parse_snapshot_tag(tag)?;
        }
        if self.minimal_snapshot {
            opts.minimal_snapshot = true;
        }
        if let Some(sa) = &self.snapshot_service_account {
            opts.snapshot_service_account = sa.clone();
        }
        Ok(opts)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();

    // fail on bad options before reading anything
    let opts = cli.options()?;
    opts.validate()?;

    let reader = RegistryDump::load(&cli.registry_dump).await?;
    let snapshotter = Snapshotter::with_reader(reader);

    let rii = snapshotter.build_snapshot(&opts).await?;
    snapshotter.snapshot(&opts, &rii, &mut std::io::stdout().lock())?;

    Ok(())
}
