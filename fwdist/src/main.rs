use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use fwbuild::build::BuildInfo;
use fwbuild::dist::{self, DistOptions};
use log::*;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    author,
    about = "Packages a finished firmware build into a self-contained project",
    setting = structopt::clap::AppSettings::DeriveDisplayOrder
)]
struct Opt {
    /// Prints verbose output
    #[structopt(short, long)]
    verbose: bool,
    /// Stay quiet, don't print any output
    #[structopt(short, long)]
    quiet: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Exports the build as a project directory plus archive
    Dist {
        /// Build info dump written by the build step
        #[structopt(parse(from_os_str), default_value = "fwbuild-build.json")]
        build_info: PathBuf,

        /// Strip the framework tree down to the sources the build consumed
        #[structopt(long)]
        strip: bool,

        /// Skip regenerating IDE project files in the exported tree
        #[structopt(long)]
        no_projects: bool,

        /// Timeout in seconds for each project regeneration
        #[structopt(long, default_value = "120")]
        timeout: u64,
    },
    /// Prints the framework sources a stripped export would keep
    Sources {
        /// Build info dump written by the build step
        #[structopt(parse(from_os_str), default_value = "fwbuild-build.json")]
        build_info: PathBuf,
    },
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    env_logger::Builder::from_env(
        env_logger::Env::new()
            .write_style_or("FWDIST_LOG_STYLE", "Auto")
            .filter_or(
                "FWDIST_LOG",
                (if opt.quiet {
                    LevelFilter::Warn
                } else if opt.verbose {
                    LevelFilter::Debug
                } else {
                    LevelFilter::Info
                })
                .to_string(),
            ),
    )
    .target(env_logger::Target::Stderr)
    .format_level(false)
    .format_indent(None)
    .format_module_path(false)
    .format_timestamp(None)
    .init();

    match opt.cmd {
        Command::Dist {
            build_info,
            strip,
            no_projects,
            timeout,
        } => {
            let info = BuildInfo::load(&build_info)?;
            let env = info.environment()?;

            let dist_dir = dist::make_dist(
                &env,
                &info.graph,
                &DistOptions {
                    strip,
                    regenerate_projects: !no_projects,
                    regen_timeout: Duration::from_secs(timeout),
                },
            )?;

            info!("Project exported to '{}'", dist_dir.display());
            Ok(())
        }
        Command::Sources { build_info } => {
            let info = BuildInfo::load(&build_info)?;
            let env = info.environment()?;

            for source in dist::stripped_sources(&env, &info.graph).files {
                println!("{}", source.display());
            }

            Ok(())
        }
    }
}
