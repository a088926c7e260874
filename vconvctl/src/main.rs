use clap::Parser;

fn main() {
    vconvctl::init_tracing();
    let cli = vconvctl::Cli::parse();
    if let Err(err) = vconvctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
