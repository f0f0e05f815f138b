use super::{EpochRecord, FoldHistory, History};
use crate::{
    common::*,
    config::{Config, TrainingConfig, Validation},
    utils,
};

/// Trains one model per validation fold on the configured device.
///
/// Images enter the model channels-first as `[N, 3, H, W]` and masks as
/// `[N, 1, H, W]`. Data stays on the CPU and is moved per batch.
pub fn training_worker(config: &Config, dataset: &Dataset, checkpoint_dir: &Path) -> Result<History> {
    let TrainingConfig {
        ref validation,
        ref load_checkpoint,
        device,
        ..
    } = config.training;
    info!("use single device {:?}", device);

    // resolved before any fold of this run saves a checkpoint
    let init_checkpoint = utils::resolve_checkpoint(&config.logging.dir, load_checkpoint)?;

    let images = dataset.images_tensor().permute(&[0, 3, 1, 2]);
    let masks = dataset.masks_tensor()?.permute(&[0, 3, 1, 2]);
    let folds = validation.folds(dataset.len())?;
    let is_kfold = matches!(validation, Validation::KFold { .. });

    let folds = folds
        .iter()
        .enumerate()
        .map(|(index, fold)| {
            let fold_dir = if is_kfold {
                checkpoint_dir.join(format!("fold-{}", index))
            } else {
                checkpoint_dir.to_owned()
            };
            fs::create_dir_all(&fold_dir)?;
            info!(
                "fold {}: {} training and {} validation samples",
                index,
                fold.train.len(),
                fold.validation.len()
            );
            train_fold(
                config,
                &images,
                &masks,
                index,
                fold,
                init_checkpoint.as_deref(),
                &fold_dir,
            )
            .with_context(|| format!("training failed in fold {}", index))
        })
        .try_collect()?;

    Ok(History { folds })
}

fn train_fold(
    config: &Config,
    images: &Tensor,
    masks: &Tensor,
    index: usize,
    fold: &Fold,
    init_checkpoint: Option<&Path>,
    checkpoint_dir: &Path,
) -> Result<FoldHistory> {
    let TrainingConfig {
        batch_size,
        epochs,
        lr,
        loss,
        ref validation,
        early_stopping_patience,
        device,
        ..
    } = config.training;
    let batch_size = batch_size.get();

    // init model
    info!("initializing model");
    let mut vs = nn::VarStore::new(device);
    let model = config.model.build(&vs.root())?;
    let loss_fn = loss.build()?;
    let mut optimizer = nn::Adam::default().build(&vs, lr.raw())?;

    // load checkpoint
    if let Some(path) = init_checkpoint {
        utils::load_checkpoint(&mut vs, path)?;
    }

    let mut rng = StdRng::seed_from_u64(validation.seed().wrapping_add(index as u64));
    let mut records = vec![];
    let mut best_val_loss = f64::INFINITY;
    let mut best_checkpoint = None;
    let mut stale_epochs = 0;
    let mut early_stopped = false;

    for epoch in 0..epochs.get() {
        // training
        let mut train_indices = fold.train.clone();
        train_indices.shuffle(&mut rng);
        let mut loss_sum = 0.0;

        for batch in train_indices.chunks(batch_size) {
            let (xs, ys) = select_batch(images, masks, batch, device);
            let pred = model.forward_t(&xs, true)?;
            let loss = loss_fn.forward(&ys, &pred)?;
            optimizer.backward_step(&loss);
            loss_sum += f64::from(&loss) * batch.len() as f64;
        }
        let train_loss = loss_sum / train_indices.len() as f64;
        ensure!(
            train_loss.is_finite(),
            "training loss diverges to {} at epoch {}",
            train_loss,
            epoch
        );

        // validation
        let (val_loss, val_auc) = tch::no_grad(|| {
            evaluate(&model, &loss_fn, images, masks, &fold.validation, batch_size, device)
        })?;
        ensure!(
            val_loss.is_finite(),
            "validation loss diverges to {} at epoch {}",
            val_loss,
            epoch
        );

        info!(
            "fold: {}\tepoch: {}\ttrain_loss: {:.5}\tval_loss: {:.5}\tval_auc: {}",
            index,
            epoch,
            train_loss,
            val_loss,
            val_auc.map_or_else(|| "n/a".into(), |auc| format!("{:.4}", auc))
        );
        records.push(EpochRecord {
            epoch,
            train_loss,
            val_loss,
            val_auc,
        });

        // keep the best checkpoint only
        if val_loss < best_val_loss {
            best_val_loss = val_loss;
            stale_epochs = 0;
            let path = utils::save_checkpoint(&vs, checkpoint_dir, epoch, val_loss)?;
            if let Some(prev) = best_checkpoint.replace(path) {
                fs::remove_file(&prev)
                    .with_context(|| format!("failed to remove '{}'", prev.display()))?;
            }
        } else {
            stale_epochs += 1;
            debug!("validation loss has not improved for {} epochs", stale_epochs);
        }

        if let Some(patience) = early_stopping_patience {
            if stale_epochs >= patience.get() {
                info!("early stopping after epoch {}", epoch);
                early_stopped = true;
                break;
            }
        }
    }

    Ok(FoldHistory {
        fold: index,
        epochs: records,
        best_checkpoint,
        early_stopped,
    })
}

fn select_batch(images: &Tensor, masks: &Tensor, indices: &[usize], device: Device) -> (Tensor, Tensor) {
    let indices: Vec<i64> = indices.iter().map(|&index| index as i64).collect();
    let indices = Tensor::of_slice(&indices);
    let xs = images.index_select(0, &indices).to_device(device);
    let ys = masks.index_select(0, &indices).to_device(device);
    (xs, ys)
}

/// The mean validation loss and the pixel-wise ROC-AUC.
fn evaluate(
    model: &UNet,
    loss_fn: &Loss,
    images: &Tensor,
    masks: &Tensor,
    indices: &[usize],
    batch_size: usize,
    device: Device,
) -> Result<(f64, Option<f64>)> {
    let mut loss_sum = 0.0;
    let mut preds = vec![];
    let mut targets = vec![];

    for batch in indices.chunks(batch_size) {
        let (xs, ys) = select_batch(images, masks, batch, device);
        let pred = model.forward_t(&xs, false)?;
        let loss = loss_fn.forward(&ys, &pred)?;
        loss_sum += f64::from(&loss) * batch.len() as f64;
        preds.push(pred.to_device(Device::Cpu));
        targets.push(ys.to_device(Device::Cpu));
    }

    let val_loss = loss_sum / indices.len() as f64;
    let val_auc = metrics::pixel_roc_auc(&Tensor::cat(&preds, 0), &Tensor::cat(&targets, 0));
    Ok((val_loss, val_auc))
}
