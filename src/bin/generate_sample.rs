use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use iam_validate::config::{CriterionSection, RangeSection, ValidationConfig};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// (variable, unit, value in the first year, annual growth)
const VARIABLES: [(&str, &str, f64, f64); 3] = [
    ("Primary Energy", "EJ/yr", 580.0, 0.012),
    ("Final Energy", "EJ/yr", 420.0, 0.010),
    ("Emissions|CO2", "Mt CO2/yr", 37_000.0, -0.004),
];
const REGIONS: [(&str, f64); 3] = [("World", 1.0), ("Europe", 0.12), ("Asia", 0.55)];
const YEARS: [i64; 4] = [2015, 2016, 2017, 2018];
const MODELS: [&str; 2] = ["MESSAGEix", "REMIND"];
const SCENARIOS: [&str; 2] = ["Baseline", "Current Policies"];

fn reference_value(base: f64, share: f64, growth: f64, year: i64) -> f64 {
    base * share * (1.0 + growth).powi((year - YEARS[0]) as i32)
}

fn write_reference(path: &str) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path).context("creating reference CSV")?;
    let mut header = vec!["Model", "Scenario", "Region", "Variable", "Unit"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    header.extend(YEARS.iter().map(|y| y.to_string()));
    writer.write_record(&header)?;

    let mut rows = 0;
    for (variable, unit, base, growth) in VARIABLES {
        for (region, share) in REGIONS {
            let mut record = vec![
                "Reference".to_string(),
                "Historical".to_string(),
                region.to_string(),
                variable.to_string(),
                unit.to_string(),
            ];
            record.extend(
                YEARS
                    .iter()
                    .map(|&y| format!("{:.3}", reference_value(base, share, growth, y))),
            );
            writer.write_record(&record)?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

fn write_model(path: &str, rng: &mut SimpleRng) -> Result<usize> {
    let mut models = Vec::new();
    let mut scenarios = Vec::new();
    let mut regions = Vec::new();
    let mut variables = Vec::new();
    let mut units = Vec::new();
    let mut years = Vec::new();
    let mut values = Vec::new();

    for model in MODELS {
        for scenario in SCENARIOS {
            for (variable, unit, base, growth) in VARIABLES {
                for (region, share) in REGIONS {
                    for year in YEARS {
                        // Most points within a few percent, some well outside.
                        let spread = if rng.next_f64() < 0.2 { 0.15 } else { 0.02 };
                        let value =
                            reference_value(base, share, growth, year) * rng.gauss(1.0, spread);
                        models.push(model);
                        scenarios.push(scenario);
                        regions.push(region);
                        variables.push(variable);
                        units.push(unit);
                        years.push(year);
                        values.push(value);
                    }
                }
            }
        }
    }
    let rows = values.len();

    let schema = Arc::new(Schema::new(vec![
        Field::new("model", DataType::Utf8, false),
        Field::new("scenario", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("variable", DataType::Utf8, false),
        Field::new("unit", DataType::Utf8, false),
        Field::new("year", DataType::Int64, false),
        Field::new("value", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(models)),
            Arc::new(StringArray::from(scenarios)),
            Arc::new(StringArray::from(regions)),
            Arc::new(StringArray::from(variables)),
            Arc::new(StringArray::from(units)),
            Arc::new(Int64Array::from(years)),
            Arc::new(Float64Array::from(values)),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).context("creating model parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(rows)
}

fn write_config(path: &str) -> Result<()> {
    let config = ValidationConfig {
        criterion: Some(CriterionSection {
            name: Some("Reference data ratio comparison".to_string()),
            comparison: Some("ratio".to_string()),
            broadcast_dims: vec!["model".to_string(), "scenario".to_string()],
            ..CriterionSection::default()
        }),
        target: Some(1.0),
        range: Some(RangeSection::Relative([0.95, 1.05])),
        ..ValidationConfig::default()
    };
    let text = serde_json::to_string_pretty(&config)?;
    std::fs::write(path, text).context("writing config")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let reference_path = "sample_reference.csv";
    let model_path = "sample_model.parquet";
    let config_path = "sample_config.json";

    let ref_rows = write_reference(reference_path)?;
    let model_rows = write_model(model_path, &mut rng)?;
    write_config(config_path)?;

    println!("Wrote {ref_rows} reference timeseries to {reference_path}");
    println!("Wrote {model_rows} model data points to {model_path}");
    println!("Wrote validation config to {config_path}");
    Ok(())
}
