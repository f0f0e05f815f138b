use crate::{common::*, config::LoadCheckpoint};

pub const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";

const CHECKPOINT_FILENAME_PATTERN: &str =
    r"^(\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}\.\d{3}[+-]\d{4})_\d{6}_\d+\.\d+\.ckpt$";

/// Save parameters to a checkpoint file named after the time, epoch and loss.
pub fn save_checkpoint(
    vs: &nn::VarStore,
    checkpoint_dir: &Path,
    epoch: usize,
    loss: f64,
) -> Result<PathBuf> {
    let filename = format!(
        "{}_{:06}_{:08.5}.ckpt",
        Local::now().format(FILE_STRFTIME),
        epoch,
        loss
    );
    let path = checkpoint_dir.join(filename);
    vs.save(&path)
        .with_context(|| format!("failed to save checkpoint '{}'", path.display()))?;
    Ok(path)
}

/// Finds the most recent checkpoint file under the run directories of `logging_dir`.
pub fn find_recent_checkpoint(logging_dir: &Path) -> Result<Option<PathBuf>> {
    let checkpoint_filename_regex = Regex::new(CHECKPOINT_FILENAME_PATTERN)?;
    let pattern = format!(
        "{}/*/checkpoints/**/*.ckpt",
        glob::Pattern::escape(&logging_dir.display().to_string())
    );
    let paths: Vec<_> = glob::glob(&pattern)?.try_collect()?;

    let checkpoint_file = paths
        .into_iter()
        .filter_map(|path| {
            let file_name = path.file_name()?.to_str()?;
            let captures = checkpoint_filename_regex.captures(file_name)?;
            let datetime_str = captures.get(1)?.as_str();
            let datetime = DateTime::parse_from_str(datetime_str, FILE_STRFTIME).ok()?;
            Some((path, datetime))
        })
        .max_by_key(|(_path, datetime)| *datetime)
        .map(|(path, _datetime)| path);
    Ok(checkpoint_file)
}

/// Picks the checkpoint file to start from with specified checkpoint loading method.
pub fn resolve_checkpoint(
    logging_dir: &Path,
    load_checkpoint: &LoadCheckpoint,
) -> Result<Option<PathBuf>> {
    let path = match load_checkpoint {
        LoadCheckpoint::Disabled => {
            info!("checkpoint loading is disabled");
            None
        }
        LoadCheckpoint::FromRecent => {
            let checkpoint_file = find_recent_checkpoint(logging_dir)?;
            if checkpoint_file.is_none() {
                warn!("no checkpoint file found");
            }
            checkpoint_file
        }
        LoadCheckpoint::FromFile { file } => {
            if file.is_file() {
                Some(file.to_owned())
            } else {
                warn!("{} is not a file", file.display());
                None
            }
        }
    };
    Ok(path)
}

/// Load parameters from a checkpoint file into existing variables.
pub fn load_checkpoint(vs: &mut nn::VarStore, path: &Path) -> Result<()> {
    info!("load checkpoint file {}", path.display());
    vs.load_partial(path)
        .with_context(|| format!("failed to load checkpoint '{}'", path.display()))?;
    Ok(())
}
