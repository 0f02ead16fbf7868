// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `dpm` command-line entry point.

Thin shell over [cli::run_cli]: parse arguments, build the core services
(configuration, logging, module runtime), dispatch to whichever module the
subcommand names, and translate the outcome into a process exit code. The
binary itself does not know how `build`, `verify` or `info` work; that
behavior lives behind the `dpm_core::Module` trait in `modules`.
*/

mod cli;
mod modules;

fn main() {
    let code = match cli::run_cli() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    };

    std::process::exit(code);
}
