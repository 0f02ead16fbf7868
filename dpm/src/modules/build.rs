// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `build`: lay out a fresh stage, optionally seal it, optionally sign its
components along the way.

All of the actual filesystem and archive work is `dpm_package`'s; this
module is the argument parser and the glue that decides, from flags, which
of `create_stage` / `seal_stage_components` / signing / `seal_final` to
call and in what order.
*/

use {
    clap::{Arg, ArgAction, Command},
    dpm_core::{ConfigRegistry, Level, LoggerContext, Module},
    dpm_package::StageParams,
    dpm_signing::Keyring,
    std::path::{Path, PathBuf},
};

pub struct BuildModule {
    config: ConfigRegistry,
    logger: LoggerContext,
}

impl BuildModule {
    pub fn new(config: ConfigRegistry, logger: LoggerContext) -> Self {
        Self { config, logger }
    }

    fn parser(command: &str) -> Command {
        Command::new(command.to_string())
            .no_binary_name(true)
            .arg(Arg::new("name").long("name").num_args(1).required(true))
            .arg(Arg::new("version").long("version").num_args(1).required(true))
            .arg(Arg::new("arch").long("arch").num_args(1).default_value("x86_64"))
            .arg(Arg::new("os").long("os").num_args(1))
            .arg(
                Arg::new("contents")
                    .long("contents")
                    .num_args(1)
                    .required(true)
                    .value_name("DIR"),
            )
            .arg(Arg::new("hooks").long("hooks").num_args(1).value_name("DIR"))
            .arg(
                Arg::new("output-dir")
                    .long("output-dir")
                    .num_args(1)
                    .default_value("."),
            )
            .arg(Arg::new("force").long("force").action(ArgAction::SetTrue))
            .arg(Arg::new("seal").long("seal").action(ArgAction::SetTrue))
            .arg(Arg::new("sign-key").long("sign-key").num_args(1).value_name("KEY_ID"))
            .arg(
                Arg::new("secret-keyring")
                    .long("secret-keyring")
                    .num_args(1)
                    .value_name("DIR"),
            )
    }

    fn run(&self, command: &str, args: &[String]) -> dpm_package::Result<i32> {
        let matches = match Self::parser(command).try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e) => {
                eprintln!("{}", e);
                return Ok(1);
            }
        };

        let name = matches.get_one::<String>("name").unwrap();
        let version = matches.get_one::<String>("version").unwrap();
        let arch = matches.get_one::<String>("arch").unwrap();
        let os = matches
            .get_one::<String>("os")
            .cloned()
            .or_else(|| self.config.get("build", "os"))
            .unwrap_or_else(|| "linux".to_string());
        let contents = PathBuf::from(matches.get_one::<String>("contents").unwrap());
        let hooks = matches.get_one::<String>("hooks").map(PathBuf::from);
        let output_dir = PathBuf::from(matches.get_one::<String>("output-dir").unwrap());
        let force = matches.get_flag("force");
        let seal = matches.get_flag("seal");
        let sign_key = matches.get_one::<String>("sign-key").cloned();

        let algorithm = super::resolve_algorithm(&self.config);

        let params = StageParams {
            output_dir: &output_dir,
            contents_source: &contents,
            hooks_source: hooks.as_deref(),
            package_name: name,
            package_version: version,
            architecture: arch,
            os: &os,
            force,
        };

        let stage = dpm_package::create_stage(&params, algorithm)?;
        self.logger.log(Level::Info, &format!("staged {}", stage.display()));

        if let Some(key_id) = sign_key {
            let keyring_dir = matches
                .get_one::<String>("secret-keyring")
                .cloned()
                .or_else(|| self.config.get("signing", "secret_keyring"))
                .ok_or_else(|| {
                    dpm_package::Error::Undefined(
                        "--sign-key given without --secret-keyring and no signing.secret_keyring configured"
                            .to_string(),
                    )
                })?;

            dpm_package::seal_stage_components(&stage, algorithm)?;
            sign_components(&stage, Path::new(&keyring_dir), &key_id)?;
        }

        if seal {
            let dpm_path = dpm_package::seal_final(&stage, Some(&output_dir), algorithm)?;
            self.logger.con(Level::Info, &format!("sealed {}", dpm_path.display()));
        }

        Ok(0)
    }
}

/// Sign each of the three required components that sealing has already
/// replaced with gzipped tars, writing each detached signature to
/// `stage/signatures/<component>.signature`.
fn sign_components(stage: &Path, keyring_dir: &Path, key_id: &str) -> dpm_package::Result<()> {
    let keyring = Keyring::load_secret_keys_dir(keyring_dir)?;
    let signatures_dir = stage.join("signatures");
    std::fs::create_dir_all(&signatures_dir)?;

    for component in ["contents", "hooks", "metadata"] {
        let payload = stage.join(component);
        let signature = dpm_signing::sign_detached(&payload, &keyring, key_id, || {
            std::env::var("DPM_KEY_PASSPHRASE").unwrap_or_default()
        })?;
        std::fs::write(signatures_dir.join(format!("{}.signature", component)), signature)?;
    }

    Ok(())
}

impl Module for BuildModule {
    fn execute(&self, command: &str, args: &[String]) -> i32 {
        match self.run(command, args) {
            Ok(code) => code,
            Err(e) => {
                self.logger.log(Level::Error, &e.to_string());
                eprintln!("error: {}", e);
                1
            }
        }
    }

    fn version(&self) -> String {
        "0.1.0-pre".to_string()
    }

    fn description(&self) -> String {
        "Stage, populate, and optionally seal a new package".to_string()
    }
}
