use std::process::ExitCode;

fn main() -> ExitCode {
    match evds_harvest::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("evds: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
