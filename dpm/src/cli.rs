// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Top-level argument shredding, following `pyoxidizer::cli`'s builder-style
use of `clap` rather than its derive macros.

Global flags (`--verbose`, `--config-dir`, `--modules-path`) and the
subcommand name are parsed here; everything after the subcommand name is
handed to the matching module verbatim, unparsed. This file does not know
what `--name` or `--contents` mean to `build` — that parsing lives in
`modules::build` alongside the rest of that module's behavior.
*/

use {
    anyhow::{anyhow, Result},
    clap::{Arg, ArgAction, Command},
    dpm_core::{path as module_path, Context, ConfigRegistry, Level, LoggerContext, ModuleRuntime, StaticModuleRegistry},
    std::{path::PathBuf, sync::Arc},
};

/// Default location for `*.conf` files when `--config-dir` is not given.
const DEFAULT_CONFIG_DIR: &str = "/etc/dpm/conf.d";

fn subcommand(name: &'static str, about: &'static str) -> Command {
    Command::new(name).about(about).arg(
        Arg::new("args")
            .num_args(0..)
            .trailing_var_arg(true)
            .allow_hyphen_values(true)
            .help("Arguments forwarded to the module unparsed"),
    )
}

/// Build the top-level parser, resolve core services, dispatch to the
/// requested module, and return the process exit code.
pub fn run_cli() -> Result<i32> {
    let matches = Command::new("dpm")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .version("0.1.0-pre")
        .author("Dark Horse Linux DPM contributors")
        .about("Stage, seal, unseal and verify DPM packages.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase logging verbosity (stackable)"),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .num_args(1)
                .value_name("DIR")
                .help("Directory of *.conf files to load"),
        )
        .arg(
            Arg::new("modules-path")
                .long("modules-path")
                .num_args(1)
                .value_name("DIR")
                .help("Override the dynamic module search directory"),
        )
        .subcommand(subcommand(
            "build",
            "Stage, populate, and optionally seal a new package",
        ))
        .subcommand(subcommand(
            "verify",
            "Verify a stage directory or a sealed .dpm package",
        ))
        .subcommand(subcommand(
            "info",
            "Print the metadata fields of a stage or sealed package",
        ))
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => Level::Warn,
        1 => Level::Info,
        _ => Level::Debug,
    };
    let logger = LoggerContext::new(level, true);

    let config_dir = matches
        .get_one::<String>("config-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));
    let config = ConfigRegistry::load_dir(&config_dir)?;

    let resolved_module_path = module_path::resolve_module_path(
        matches.get_one::<String>("modules-path").map(String::as_str),
        config.get("modules", "modules_path").as_deref(),
    );

    let mut registry = StaticModuleRegistry::new();
    registry.register(
        "build",
        Arc::new(crate::modules::build::BuildModule::new(
            config.clone(),
            logger.clone(),
        )),
    );
    registry.register(
        "verify",
        Arc::new(crate::modules::verify::VerifyModule::new(
            config.clone(),
            logger.clone(),
        )),
    );
    registry.register(
        "info",
        Arc::new(crate::modules::info::InfoModule::new(
            config.clone(),
            logger.clone(),
        )),
    );

    let runtime = ModuleRuntime::new(registry, resolved_module_path);
    let ctx = Context::new(config, logger, runtime);

    let (name, sub_matches) = match matches.subcommand() {
        Some((name, sub_matches)) => (name, sub_matches),
        None => return Err(anyhow!("no subcommand given")),
    };

    if !ctx.module_exists(name) {
        eprintln!("error: module not found: {}", name);
        return Ok(1);
    }

    let forwarded: Vec<String> = sub_matches
        .get_many::<String>("args")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let handle = ctx.load_module(name)?;
    let code = handle.execute(name, &forwarded)?;
    Ok(code)
}
