use anyhow::Result;
use riskflowd::cli::parse_cli;
use riskflowd::commands::run;
use riskflowd::logging::init_logging;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_logging(cli.log_format);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(cli, &mut out)
}
