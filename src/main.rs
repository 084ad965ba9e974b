use std::process::ExitCode;

use handsign::{Config, Error, ErrorKind, Pipeline};

fn main() -> ExitCode {
    handsign::init_logger!();

    let Some(path) = std::env::args_os().nth(1) else {
        eprintln!("usage: handsign <image>");
        return ExitCode::from(2);
    };

    let result = Config::from_env()
        .map_err(Error::Startup)
        .and_then(|config| Pipeline::from_config(&config))
        .and_then(|pipeline| {
            let data = std::fs::read(&path).map_err(|e| {
                Error::Input(anyhow::Error::new(e).context(format!(
                    "failed to read '{}'",
                    path.to_string_lossy()
                )))
            })?;
            let prediction = pipeline.predict_bytes(&data);
            for timer in pipeline.timers() {
                log::debug!("{}", timer);
            }
            prediction
        });

    match result {
        Ok(prediction) => match serde_json::to_string(&prediction) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("failed to serialize prediction: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::Client | ErrorKind::NoHand => {
                    log::info!("{}", e);
                    ExitCode::from(2)
                }
                ErrorKind::Internal | ErrorKind::Startup => {
                    log::error!("{}", e);
                    ExitCode::FAILURE
                }
            };
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            code
        }
    }
}
