// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `verify`: check a stage directory or a sealed `.dpm` against its own
digest chain, and optionally against detached signatures.

A `.dpm` is verified in memory by default (`dpm_package::verify_package_bytes`,
never extracting a byte to disk before its digest is checked); `--on-disk`
unseals it first and runs the disk-based checks instead. A bare stage
directory always goes through the disk-based path.
*/

use {
    clap::{Arg, ArgAction, Command},
    dpm_core::{ConfigRegistry, Level, LoggerContext, Module},
    dpm_signing::Keyring,
    std::path::{Path, PathBuf},
};

pub struct VerifyModule {
    config: ConfigRegistry,
    logger: LoggerContext,
}

impl VerifyModule {
    pub fn new(config: ConfigRegistry, logger: LoggerContext) -> Self {
        Self { config, logger }
    }

    fn parser(command: &str) -> Command {
        Command::new(command.to_string())
            .no_binary_name(true)
            .arg(Arg::new("path").required(true).value_name("STAGE_OR_DPM"))
            .arg(Arg::new("on-disk").long("on-disk").action(ArgAction::SetTrue))
            .arg(
                Arg::new("public-keyring")
                    .long("public-keyring")
                    .num_args(1)
                    .value_name("DIR"),
            )
            .arg(Arg::new("key-id").long("key-id").num_args(1).value_name("KEY_ID"))
    }

    fn run(&self, command: &str, args: &[String]) -> dpm_package::Result<i32> {
        let matches = match Self::parser(command).try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e) => {
                eprintln!("{}", e);
                return Ok(1);
            }
        };

        let path = PathBuf::from(matches.get_one::<String>("path").unwrap());
        let on_disk = matches.get_flag("on-disk");
        let keyring_dir = matches
            .get_one::<String>("public-keyring")
            .cloned()
            .or_else(|| self.config.get("signing", "public_keyring"));
        let key_id = matches.get_one::<String>("key-id").cloned();

        let algorithm = super::resolve_algorithm(&self.config);

        if path.is_dir() {
            dpm_package::verify_stage(&path, algorithm)?;
            if let Some(keyring_dir) = &keyring_dir {
                self.verify_stage_signatures(&path, Path::new(keyring_dir), key_id.as_deref())?;
            }
            self.logger.con(Level::Info, &format!("{} verified", path.display()));
            return Ok(0);
        }

        let stage_name = path
            .file_stem()
            .ok_or_else(|| dpm_package::Error::NotADpmFile(path.clone()))?
            .to_string_lossy()
            .to_string();

        if on_disk {
            let tmp = tempfile::tempdir()?;
            let stage = dpm_package::unseal_package(&path, Some(tmp.path()), false)?;
            dpm_package::verify_stage(&stage, algorithm)?;
            if let Some(keyring_dir) = &keyring_dir {
                self.verify_stage_signatures(&stage, Path::new(keyring_dir), key_id.as_deref())?;
            }
        } else {
            dpm_package::verify_package_bytes(&path, &stage_name, algorithm)?;
            if let Some(keyring_dir) = &keyring_dir {
                self.verify_sealed_signatures(&path, &stage_name, Path::new(keyring_dir), key_id.as_deref())?;
            }
        }

        self.logger.con(Level::Info, &format!("{} verified", path.display()));
        Ok(0)
    }

    /// Disk-based signature check: each component has a sibling
    /// `signatures/<component>.signature` file.
    fn verify_stage_signatures(
        &self,
        stage: &Path,
        keyring_dir: &Path,
        key_id: Option<&str>,
    ) -> dpm_package::Result<()> {
        let keyring = Keyring::load_public_keys_dir(keyring_dir)?;

        for component in ["contents", "hooks", "metadata"] {
            let signature_path = stage.join("signatures").join(format!("{}.signature", component));
            if !signature_path.exists() {
                continue;
            }

            let payload_path = stage.join(component);
            let outcome = dpm_signing::verify_detached(&payload_path, &signature_path, &keyring, key_id)?;
            if !outcome.is_valid() {
                return Err(dpm_package::Error::SignatureInvalid(component.to_string()));
            }
        }

        Ok(())
    }

    /// In-memory signature check against a sealed `.dpm`: the component and
    /// its signature are both extracted as archive members, never staged to
    /// disk.
    fn verify_sealed_signatures(
        &self,
        dpm_path: &Path,
        stage_name: &str,
        keyring_dir: &Path,
        key_id: Option<&str>,
    ) -> dpm_package::Result<()> {
        let keyring = Keyring::load_public_keys_dir(keyring_dir)?;

        let signatures_archive =
            match dpm_archive::extract_member_from_file(dpm_path, format!("{}/signatures", stage_name)) {
                Ok(bytes) => bytes,
                Err(_) => return Ok(()),
            };

        for component in ["contents", "hooks", "metadata"] {
            let member = format!("{}/{}", stage_name, component);
            let signature_member = format!("signatures/{}.signature", component);

            let signature = match dpm_archive::extract_member_from_bytes(&signatures_archive, &signature_member) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };

            let payload = dpm_archive::extract_member_from_file(dpm_path, &member)?;
            let outcome = dpm_signing::verify_detached_bytes(&payload, &signature, &keyring, key_id)?;
            if !outcome.is_valid() {
                return Err(dpm_package::Error::SignatureInvalid(component.to_string()));
            }
        }

        Ok(())
    }
}

impl Module for VerifyModule {
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
        "Verify a stage directory or a sealed .dpm package".to_string()
    }
}
