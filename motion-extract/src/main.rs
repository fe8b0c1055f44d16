//! Extract displacement fields to .npy/.npz files

use clap::*;
use log::*;
use mps_motion::prelude::v1::{Result, *};
use serde_json::Value;
use std::fs::File;

#[cfg(feature = "opencv")]
const DEFAULT_ALGORITHM: &str = "farneback";
#[cfg(not(feature = "opencv"))]
const DEFAULT_ALGORITHM: &str = "lucas_kanade";

#[cfg(feature = "opencv")]
fn capabilities() -> Capabilities {
    mps_motion_cv::capabilities()
}

#[cfg(not(feature = "opencv"))]
fn capabilities() -> Capabilities {
    Capabilities::default()
}

fn main() -> Result<()> {
    let matches = Command::new("motion-extract")
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .help("npz archive with frames, time_stamps and um_per_pixel")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("algorithm")
                .long("algorithm")
                .short('a')
                .takes_value(true)
                .possible_values(FlowAlgorithm::names())
                .default_value(DEFAULT_ALGORITHM),
        )
        .arg(
            Arg::new("reference")
                .long("reference")
                .short('r')
                .help("Reference time, or one of min, max, median, mean")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::new("scale")
                .long("scale")
                .short('s')
                .takes_value(true)
                .default_value("1.0"),
        )
        .arg(
            Arg::new("unit")
                .long("unit")
                .short('u')
                .takes_value(true)
                .possible_values(["pixels", "um"])
                .default_value("um"),
        )
        .arg(
            Arg::new("options")
                .long("options")
                .help("JSON file with algorithm options")
                .takes_value(true),
        )
        .arg(
            Arg::new("option")
                .long("option")
                .short('o')
                .help("Algorithm option as key=value")
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .takes_value(true)
                .possible_values(["error", "warn", "info", "debug", "trace"])
                .default_value("info"),
        )
        .arg(Arg::new("output").takes_value(true).required(true))
        .get_matches();

    let level: LevelFilter = matches.value_of("log-level").unwrap().parse()?;
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let input = matches.value_of("input").unwrap();
    let output = matches.value_of("output").unwrap();
    let algorithm = matches.value_of("algorithm").unwrap();
    let scale: f64 = matches.value_of("scale").unwrap().parse()?;
    let unit: Unit = matches.value_of("unit").unwrap().parse()?;

    let mut options = match matches.value_of("options") {
        Some(path) => json_options(serde_json::from_reader(File::open(path)?)?)?,
        None => Options::new(),
    };

    for opt in matches.values_of("option").into_iter().flatten() {
        let (key, value) = opt
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got {opt}"))?;
        options.insert(key.to_string(), Property::parse(value));
    }

    let data = MpsData::from_file(input)?;

    let reference = match matches.value_of("reference").unwrap().parse::<ReferenceFrame>()? {
        // Without time stamps a whole number can only mean a frame index.
        ReferenceFrame::Time(t) if data.time_stamps.is_none() && t >= 0.0 && t.fract() == 0.0 => {
            warn!("{input} has no time stamps, using frame {t} as reference");
            ReferenceFrame::Index(t as usize)
        }
        reference => reference,
    };

    let mut flow =
        OpticalFlow::with_capabilities(data, algorithm, reference, options, &capabilities())?;

    info!("{flow:?}, options: {:?}", flow.options());

    let u = flow
        .get_displacements(DisplacementOptions {
            unit,
            scale,
            ..Default::default()
        })?
        .into_field()
        .ok_or_else(|| anyhow!("expected a displacement field"))?;

    let max = u.norm().max().to_array();
    info!(
        "Maximum displacement {:.3} {unit}",
        max.iter().copied().fold(0.0, f64::max)
    );

    u.save(output)
}

/// Convert a JSON object into options.
///
/// Plain JSON values are accepted next to serialized [`Property`] values.
fn json_options(value: Value) -> Result<Options> {
    let map = match value {
        Value::Object(map) => map,
        other => return Err(anyhow!("expected a JSON object of options, got {other}")),
    };

    map.into_iter()
        .map(|(key, value)| -> Result<(String, Property)> {
            let prop = match value {
                Value::Bool(b) => Property::Bool(b),
                Value::String(s) => Property::String(s),
                Value::Number(n) => match n.as_u64() {
                    Some(u) => Property::usize(u as usize),
                    None => Property::float(n.as_f64().unwrap_or_default() as f32),
                },
                other => serde_json::from_value(other)?,
            };
            Ok((key, prop))
        })
        .collect()
}
