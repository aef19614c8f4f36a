use webtoon_reader::image_loader::RgbBackend;
use webtoon_reader::startup;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(debug_assertions)]
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();
    #[cfg(not(debug_assertions))]
    env_logger::init();

    let Some(args) = startup::startup_args() else {
        eprintln!("usage: webtoon-reader <pages-dir> [config.json]");
        std::process::exit(2);
    };

    let report = startup::run_sweep::<RgbBackend>(&args)?;
    log::info!(
        "Finished at page {}/{}",
        report.last_page,
        report.pages
    );

    Ok(())
}
