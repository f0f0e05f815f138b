//! Core detection on whole images with a trained segmentation model.

mod common;
pub mod detector;

pub use detector::*;

use crate::common::*;

/// Runs the detector on one image file and writes the cores as a JSON array.
///
/// With `grid` set, the cores are arranged into rows and columns first and
/// the array positions are written instead, imaginary cells included.
pub fn start(
    config: &Config,
    checkpoint: &Path,
    input: &Path,
    output: &Path,
    decode: DecodeInit,
    grid: Option<GridInit>,
) -> Result<Vec<Core>> {
    let detector = DetectorInit::from_config(config, decode).build(checkpoint)?;
    let cores = detector
        .detect_file(input)
        .with_context(|| format!("failed to detect cores in '{}'", input.display()))?;
    info!("found {} cores in '{}'", cores.len(), input.display());

    write_records(&cores, grid.as_ref(), output)?;
    Ok(cores)
}

/// Writes cores, or their array positions if `grid` is given, as a JSON array.
pub fn write_records(cores: &[Core], grid: Option<&GridInit>, output: &Path) -> Result<()> {
    let text = match grid {
        Some(grid) => {
            let cells = dearray(cores, grid)?;
            let num_imaginary = cells.iter().filter(|cell| cell.is_imaginary()).count();
            info!(
                "arranged cores into {} rows with {} imaginary cells",
                cells.last().map_or(0, |cell| cell.row + 1),
                num_imaginary
            );
            let records: Vec<GridRecord> = cells.iter().map(|cell| cell.to_record(cores)).collect();
            serde_json::to_string_pretty(&records)?
        }
        None => {
            let records: Vec<CoreRecord> = cores.iter().map(Core::to_record).collect();
            serde_json::to_string_pretty(&records)?
        }
    };
    fs::write(output, text)
        .with_context(|| format!("failed to write '{}'", output.display()))?;
    Ok(())
}
