use clap::Parser;
use env_logger::Env;
use log::warn;
use plpower::{
    config::AnalysisConfig,
    console::{Args, PartialArgs},
    error::PlResult,
    interactor::{seed_peaks, ConsolePrompt},
    loader::{CurveLoader, OriginLoader},
    measurement::MeasurementKind,
    series::PowerSeries,
    spectrum::Auxiliaries,
};
use std::io::{self, Write};

fn main() -> PlResult<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    //parse CLI arguments
    let args = Args::try_from(PartialArgs::parse())?;

    let mut config = AnalysisConfig::load(args.config_path.as_deref())?;
    if args.root_boundary.is_some() {
        config.root_boundary.clone_from(&args.root_boundary);
    }
    let fitter = config.fitter()?;
    let tracker = config.tracker()?;

    //read the power series
    let loader = OriginLoader;
    match loader.measurement_kind(&args.series_path)? {
        Some(MeasurementKind::PowerSeries) => {}
        Some(kind) => warn!(
            "{} is a {kind} measurement, reading it as power series anyway",
            args.series_path.display()
        ),
        None => warn!(
            "measurement type of {} unknown, reading it as power series",
            args.series_path.display()
        ),
    }
    let raw = loader.load_series(&args.series_path)?;

    //look up dark spectrum and power calibration
    let auxiliaries = match config.resolver()? {
        Some(resolver) => Auxiliaries::resolve(&args.series_path, &resolver, &loader, &fitter)?,
        None => Auxiliaries::default(),
    };
    let series = PowerSeries::from_source(&args.series_path, raw).with_auxiliaries(&auxiliaries)?;

    //let the operator seed the peaks
    let stdin = io::stdin();
    let mut prompt = ConsolePrompt::new(stdin.lock(), io::stdout());
    let seeds = seed_peaks(
        &mut prompt,
        &series,
        config.tracking.reference_index,
        config.tracking.default_half_span,
    )?;
    if seeds.is_empty() {
        println!("No peaks selected. Nothing to do.");
        return Ok(());
    }

    //track the peaks and write the results
    let report = tracker.fit_peaks(&series, &seeds)?;
    println!("{}", report.summary());
    print!("Write results to {}...", args.output_directory.display());
    let _ = io::stdout().flush();
    report.export(&args.output_directory)?;
    println!("Success");
    Ok(())
}
