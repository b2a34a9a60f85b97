use log::LevelFilter;

use netspot::config;
use netspot::logging;
use netspot::monitor::Monitor;
use netspot::shell::Shell;

fn main() {
    let (loaded, cli_args) = match config::load() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", netspot::shell::color::error_line(&e.to_string()));
            std::process::exit(1);
        }
    };

    let level = match cli_args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = logging::init(level, None) {
        eprintln!("{}", netspot::shell::color::error_line(&e.to_string()));
        std::process::exit(1);
    }

    let monitor = match Monitor::from_loaded(loaded) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}", netspot::shell::color::error_line(&e.to_string()));
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}", netspot::shell::color::error_line(&e.to_string()));
            std::process::exit(1);
        }
    };

    let mut shell = Shell::new(monitor, runtime.handle().clone());
    let code = shell.run();
    std::process::exit(code);
}
