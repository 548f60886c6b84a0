//! Writes a synthetic data set into `data/`: averaged and summed SHAP values,
//! model coefficients, a model cross-performance matrix, and a Parquet copy
//! of the averaged SHAP values.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

const CLUSTERS: [&str; 4] = ["CL1", "CL2", "CL3", "CL4"];
const TIME_PERIODS: [&str; 4] = ["(-4, 0]", "(0, 5]", "(5, 10]", "(10, 15]"];
const FREQUENCIES: [&str; 5] = ["delta", "theta", "alpha", "beta", "gamma"];
const STIMULI: [&str; 3] = ["Music", "Speech", "Noise"];
const TARGETS: [&str; 2] = ["Valence", "Arousal"];
const MODELS: [&str; 4] = ["Subject A", "Subject B", "Subject C", "Subject D"];
const SUBJECTS: usize = 6;

/// Deterministic PRNG (splitmix64).
struct SplitMix(u64);

impl SplitMix {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Approximately normal (sum of twelve uniforms).
    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z: f64 = (0..12).map(|_| self.unit()).sum::<f64>() - 6.0;
        mean + std_dev * z
    }
}

/// One generated SHAP observation.
struct Row {
    cluster: &'static str,
    time_period: &'static str,
    frequency: &'static str,
    stimulus: &'static str,
    target: &'static str,
    value: f64,
}

fn shap_rows(rng: &mut SplitMix, scale: f64) -> Vec<Row> {
    let mut rows = Vec::new();
    for (ci, &cluster) in CLUSTERS.iter().enumerate() {
        for (ti, &time_period) in TIME_PERIODS.iter().enumerate() {
            for (fi, &frequency) in FREQUENCIES.iter().enumerate() {
                // Later periods and lower bands matter more; clusters differ in strength.
                let base = 0.02 * (ti as f64 + 1.0) / (fi as f64 + 1.0) * (1.0 + 0.3 * ci as f64);
                for &stimulus in &STIMULI {
                    for &target in &TARGETS {
                        for _ in 0..SUBJECTS {
                            rows.push(Row {
                                cluster,
                                time_period,
                                frequency,
                                stimulus,
                                target,
                                value: scale * rng.normal(base, base * 0.5).abs(),
                            });
                        }
                    }
                }
            }
        }
    }
    rows
}

fn write_shap_csv(path: &Path, rows: &[Row]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record([
        "",
        "Cluster",
        "Time Period",
        "Frequency",
        "Stimulus",
        "TargetScore",
        "SHAP_value",
    ])?;
    for (i, row) in rows.iter().enumerate() {
        writer.write_record([
            i.to_string().as_str(),
            row.cluster,
            row.time_period,
            row.frequency,
            row.stimulus,
            row.target,
            format!("{:.6}", row.value).as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_shap_parquet(path: &Path, rows: &[Row]) -> Result<()> {
    let text = |f: fn(&Row) -> &'static str| -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
    };
    let schema = Arc::new(Schema::new(vec![
        Field::new("Cluster", DataType::Utf8, false),
        Field::new("Time Period", DataType::Utf8, false),
        Field::new("Frequency", DataType::Utf8, false),
        Field::new("Stimulus", DataType::Utf8, false),
        Field::new("TargetScore", DataType::Utf8, false),
        Field::new("SHAP_value", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            text(|r| r.cluster),
            text(|r| r.time_period),
            text(|r| r.frequency),
            text(|r| r.stimulus),
            text(|r| r.target),
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.value).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building record batch")?;

    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn write_coefficients(path: &Path, rng: &mut SplitMix) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record([
        "Cluster",
        "Time Period",
        "Frequency",
        "Stimulus",
        "TargetScore",
        "features",
        "params_significant",
        "SHAP_value",
    ])?;
    let mut n = 0;
    for &stimulus in &STIMULI {
        for &target in &TARGETS {
            for &cluster in &CLUSTERS[..2] {
                for &frequency in &FREQUENCIES {
                    let time_period = TIME_PERIODS[1];
                    let feature = format!("{cluster}_{frequency}");
                    let effect = rng.normal(0.0, 1.0);
                    // Some coefficients were not significant and are left empty.
                    let coefficient = if rng.unit() < 0.15 {
                        String::new()
                    } else {
                        format!("{:.6}", effect * 0.4)
                    };
                    let shap = format!("{:.6}", (effect + rng.normal(0.0, 0.3)).abs() * 0.05);
                    writer.write_record([
                        cluster,
                        time_period,
                        frequency,
                        stimulus,
                        target,
                        feature.as_str(),
                        coefficient.as_str(),
                        shap.as_str(),
                    ])?;
                    n += 1;
                }
            }
        }
    }
    writer.flush()?;
    Ok(n)
}

fn write_model_performance(path: &Path, rng: &mut SplitMix) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["Cross-subject model performance (AUC)"])?;
    writer.write_record(MODELS)?;
    for i in 0..MODELS.len() {
        let row: Vec<String> = (0..MODELS.len())
            .map(|j| {
                let auc = if i == j {
                    rng.normal(0.85, 0.03)
                } else {
                    rng.normal(0.6, 0.06)
                };
                format!("{:.3}", auc.clamp(0.0, 1.0))
            })
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let out = Path::new("data");
    fs::create_dir_all(out).context("creating data directory")?;
    let mut rng = SplitMix(42);

    let mean_rows = shap_rows(&mut rng, 1.0);
    write_shap_csv(&out.join("shap_values_mean.csv"), &mean_rows)?;
    write_shap_parquet(&out.join("shap_values_mean.parquet"), &mean_rows)?;

    let sum_rows = shap_rows(&mut rng, 40.0);
    write_shap_csv(&out.join("shap_values_sum.csv"), &sum_rows)?;

    let n_coefficients = write_coefficients(&out.join("coefficients.csv"), &mut rng)?;
    write_model_performance(&out.join("model_performance.csv"), &mut rng)?;

    log::info!(
        "Wrote {} SHAP rows per source and {n_coefficients} coefficient rows to {}",
        mean_rows.len(),
        out.display()
    );
    println!("Sample data written to {}", out.display());
    Ok(())
}
