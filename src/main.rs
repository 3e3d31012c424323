use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;

use saber_builder::{
    Args, OutputFormat, RunSettings, fake_clients, host_capability_probe, real_radio_adapter,
    run_with_settings,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let output_format = args.output_format().unwrap_or(if stdout.is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
        let settings = RunSettings::builder()
            .config(args.session_config()?)
            .maybe_log_level(args.log_level())
            .output_format(output_format)
            .build();
        let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
        let (radio, probe) = match maybe_fake_args {
            Some(fake_args) => fake_clients(&fake_args),
            None => (real_radio_adapter().await?, host_capability_probe()),
        };

        run_with_settings(command, &mut stdout, radio, probe, settings).await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
