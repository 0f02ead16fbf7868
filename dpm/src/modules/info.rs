// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `info`: print the metadata fields of a stage directory or a sealed
`.dpm`, without mutating either.

A sealed `.dpm` is read with `dpm_package::read_package_metadata`, which
extracts only the `metadata` inner archive and never writes a byte to
disk; a stage directory is read with `read_stage_metadata`, which copes
with `metadata/` being either a plain directory or an already-sealed
gzipped tar.
*/

use {
    clap::{Arg, Command},
    dpm_core::{ConfigRegistry, Level, LoggerContext, Module},
    std::path::PathBuf,
};

pub struct InfoModule {
    config: ConfigRegistry,
    logger: LoggerContext,
}

impl InfoModule {
    pub fn new(config: ConfigRegistry, logger: LoggerContext) -> Self {
        Self { config, logger }
    }

    fn parser(command: &str) -> Command {
        Command::new(command.to_string())
            .no_binary_name(true)
            .arg(Arg::new("path").required(true).value_name("STAGE_OR_DPM"))
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

        let fields = if path.is_dir() {
            dpm_package::read_stage_metadata(&path)?
        } else {
            let stage_name = path
                .file_stem()
                .ok_or_else(|| dpm_package::Error::NotADpmFile(path.clone()))?
                .to_string_lossy()
                .to_string();
            dpm_package::read_package_metadata(&path, &stage_name)?
        };

        // metadata_file_names() order is the canonical one; a BTreeMap
        // sorts the same way coincidentally since every field is
        // upper-case, so printing it in key order reads the same as the
        // skeleton was written.
        for (key, value) in &fields {
            println!("{}: {}", key, value);
        }

        if fields.contains_key("PACKAGE_DIGEST") {
            println!("checksum_algorithm: {}", super::resolve_algorithm(&self.config).name());
        }

        Ok(0)
    }
}

impl Module for InfoModule {
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
        "Print the metadata fields of a stage or sealed package".to_string()
    }
}
