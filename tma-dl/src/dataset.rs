//! Assembles paired image and mask (or box) arrays from annotated image directories.

use crate::{
    boxes::{pad_boxes, PaddedBoxBatch},
    common::*,
    mask::{rasterize, MaskRaster},
};

/// The mapping of 8-bit pixel values to floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// `v / 255`, in `[0, 1]`.
    ZeroOne,
    /// `v / 127.5 - 1`, in `[-1, 1]`.
    SymmetricOne,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::ZeroOne
    }
}

impl Normalization {
    pub fn apply(&self, image: &Tensor) -> Tensor {
        let image = image.to_kind(Kind::Float);
        match self {
            Self::ZeroOne => image / 255.0,
            Self::SymmetricOne => image / 127.5 - 1.0,
        }
    }
}

/// How image files are matched with annotation files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pairing {
    /// The i-th image in name order pairs with the i-th annotation file.
    Positional,
    /// Images and annotation files pair by identical file stems.
    ByStem,
}

impl Default for Pairing {
    fn default() -> Self {
        Self::ByStem
    }
}

/// The kind of training target to produce.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Target {
    Mask,
    Boxes { max_boxes: usize, pad_value: R64 },
}

impl Default for Target {
    fn default() -> Self {
        Self::Mask
    }
}

/// A decoded image of shape `[H, W, 3]` with normalized float values.
#[derive(Debug)]
pub struct ImageRaster {
    tensor: Tensor,
    orig_size: HW<usize>,
    normalization: Normalization,
}

impl ImageRaster {
    /// Decodes an RGB image, resizes it to `size` when needed and normalizes it.
    pub fn load(path: impl AsRef<Path>, size: &HW<usize>, normalization: Normalization) -> Result<Self> {
        let path = path.as_ref();
        ensure!(size.is_positive(), "image size must be positive");

        let image = vision::image::load(path)
            .with_context(|| format!("failed to decode image '{}'", path.display()))?;
        let (channels, height, width) = image.size3()?;
        let image = match channels {
            3 => image,
            1 => image.repeat(&[3, 1, 1]),
            4 => image.narrow(0, 0, 3),
            _ => bail!(
                "image '{}' has {} channels, which cannot be read as RGB",
                path.display(),
                channels
            ),
        };
        let orig_size = HW::from_hw([height as usize, width as usize]);

        let image = if orig_size != *size {
            let [target_h, target_w] = size.hw();
            vision::image::resize(&image, target_w as i64, target_h as i64)?
        } else {
            image
        };
        let tensor = normalization.apply(&image.permute(&[1, 2, 0]));

        Ok(Self {
            tensor,
            orig_size,
            normalization,
        })
    }

    /// The `[H, W, 3]` float tensor.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn size(&self) -> HW<usize> {
        let size = self.tensor.size();
        HW::from_hw([size[0] as usize, size[1] as usize])
    }

    /// The size of the image file before resizing.
    pub fn orig_size(&self) -> HW<usize> {
        self.orig_size
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }
}

/// An image file and its annotation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub image_file: PathBuf,
    pub label_file: PathBuf,
}

#[derive(Debug)]
pub enum Targets {
    Masks(Vec<MaskRaster>),
    Boxes(PaddedBoxBatch),
}

/// The dataset assembler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblerInit {
    pub image_dir: PathBuf,
    pub label_dir: PathBuf,
    /// Recognized image extensions, matched case-insensitively.
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_label_extension")]
    pub label_extension: String,
    /// The resolution the annotations refer to. Defaults to each image's own size.
    #[serde(default)]
    pub annotation_size: Option<HW<usize>>,
    /// The resolution of produced images and targets.
    pub target_size: HW<usize>,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub pairing: Pairing,
    #[serde(default)]
    pub radius_policy: RadiusPolicy,
    #[serde(default)]
    pub target: Target,
}

fn default_image_extensions() -> Vec<String> {
    vec!["png".into()]
}

fn default_label_extension() -> String {
    "json".into()
}

impl AssemblerInit {
    pub fn new(image_dir: impl AsRef<Path>, label_dir: impl AsRef<Path>, target_size: HW<usize>) -> Self {
        Self {
            image_dir: image_dir.as_ref().to_owned(),
            label_dir: label_dir.as_ref().to_owned(),
            image_extensions: default_image_extensions(),
            label_extension: default_label_extension(),
            annotation_size: None,
            target_size,
            normalization: Default::default(),
            pairing: Default::default(),
            radius_policy: Default::default(),
            target: Default::default(),
        }
    }

    /// Loads every image/annotation pair and builds the training targets.
    pub fn assemble(&self) -> Result<Dataset> {
        let Self {
            ref image_dir,
            ref label_dir,
            ref image_extensions,
            ref label_extension,
            target_size,
            normalization,
            pairing,
            target,
            ..
        } = *self;

        ensure!(
            target_size.is_positive(),
            "target_size must be positive, but get {:?}",
            target_size.hw()
        );
        if let Some(size) = self.annotation_size {
            ensure!(
                size.is_positive(),
                "annotation_size must be positive, but get {:?}",
                size.hw()
            );
        }

        let image_files = list_files(image_dir, image_extensions)?;
        let label_files = list_files(label_dir, &[label_extension.clone()])?;
        let pairs = pair_files(image_files, label_files, pairing)?;
        info!(
            "found {} image/annotation pairs in '{}'",
            pairs.len(),
            image_dir.display()
        );

        let (images, cores): (Vec<_>, Vec<_>) = pairs
            .iter()
            .map(|sample| {
                self.load_sample(sample).with_context(|| {
                    format!(
                        "failed to load sample '{}' with '{}'",
                        sample.image_file.display(),
                        sample.label_file.display()
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();

        let targets = match target {
            Target::Mask => {
                let masks: Vec<_> = cores
                    .iter()
                    .map(|cores| rasterize(cores, &target_size))
                    .collect();
                for (mask, image, sample) in izip!(&masks, &images, &pairs) {
                    ensure!(
                        mask.size() == image.size(),
                        "mask size {:?} does not match image size {:?} of '{}'",
                        mask.size().hw(),
                        image.size().hw(),
                        sample.image_file.display()
                    );
                }
                Targets::Masks(masks)
            }
            Target::Boxes {
                max_boxes,
                pad_value,
            } => {
                let frame = target_size.cast::<f64>();
                let boxes: Vec<_> = cores
                    .iter()
                    .map(|cores| label::to_boxes(cores, &frame))
                    .try_collect()?;
                let batch = pad_boxes(&boxes, max_boxes, pad_value.raw())?;
                if batch.total_dropped() > 0 {
                    warn!(
                        "{} boxes dropped in total due to max_boxes = {}",
                        batch.total_dropped(),
                        max_boxes
                    );
                }
                Targets::Boxes(batch)
            }
        };

        Ok(Dataset {
            pairs,
            images,
            targets,
            normalization,
            size: target_size,
        })
    }

    fn load_sample(&self, sample: &Sample) -> Result<(ImageRaster, Vec<Core>)> {
        let Sample {
            image_file,
            label_file,
        } = sample;

        let image = ImageRaster::load(image_file, &self.target_size, self.normalization)?;

        let text = fs::read_to_string(label_file)
            .with_context(|| format!("failed to read '{}'", label_file.display()))?;
        let records: Vec<CoreRecord> = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse '{}'", label_file.display()))?;
        let cores = self
            .radius_policy
            .resolve_all(&records)
            .with_context(|| format!("invalid annotation in '{}'", label_file.display()))?;

        let from = self.annotation_size.unwrap_or_else(|| image.orig_size());
        let cores = label::rescale(&cores, &from.cast(), &self.target_size.cast())?;
        debug!(
            "loaded {} cores from '{}'",
            cores.len(),
            label_file.display()
        );

        Ok((image, cores))
    }
}

/// The assembled dataset, in pairing order.
#[derive(Debug)]
pub struct Dataset {
    pub pairs: Vec<Sample>,
    pub images: Vec<ImageRaster>,
    pub targets: Targets,
    pub normalization: Normalization,
    pub size: HW<usize>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Stacked images of shape `[N, H, W, 3]`.
    pub fn images_tensor(&self) -> Tensor {
        if self.images.is_empty() {
            let [height, width] = self.size.hw();
            return Tensor::zeros(
                &[0, height as i64, width as i64, 3],
                (Kind::Float, Device::Cpu),
            );
        }
        let tensors: Vec<_> = self.images.iter().map(|image| image.tensor()).collect();
        Tensor::stack(&tensors, 0)
    }

    /// Stacked masks of shape `[N, H, W, 1]`.
    pub fn masks_tensor(&self) -> Result<Tensor> {
        let masks = match &self.targets {
            Targets::Masks(masks) => masks,
            Targets::Boxes(_) => bail!("the dataset holds box targets instead of masks"),
        };
        if masks.is_empty() {
            let [height, width] = self.size.hw();
            return Ok(Tensor::zeros(
                &[0, height as i64, width as i64, 1],
                (Kind::Float, Device::Cpu),
            ));
        }
        let tensors: Vec<_> = masks.iter().map(MaskRaster::to_tensor).collect();
        Ok(Tensor::stack(&tensors, 0))
    }

    pub fn boxes(&self) -> Option<&PaddedBoxBatch> {
        match &self.targets {
            Targets::Boxes(batch) => Some(batch),
            Targets::Masks(_) => None,
        }
    }
}

/// Lists files in `dir` with one of `extensions`, sorted by file name.
fn list_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    ensure!(dir.is_dir(), "'{}' is not a directory", dir.display());
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let dir_pattern = glob::Pattern::escape(&dir.display().to_string());

    let mut files = vec![];
    for ext in extensions {
        let pattern = format!("{}/*.{}", dir_pattern, ext);
        for path in glob::glob_with(&pattern, options)? {
            let path = path?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort_by(|lhs, rhs| lhs.file_name().cmp(&rhs.file_name()));
    files.dedup();
    Ok(files)
}

fn pair_files(images: Vec<PathBuf>, labels: Vec<PathBuf>, pairing: Pairing) -> Result<Vec<Sample>> {
    let samples = match pairing {
        Pairing::Positional => {
            ensure!(
                images.len() == labels.len(),
                "found {} images but {} annotation files",
                images.len(),
                labels.len()
            );
            izip!(images, labels)
                .map(|(image_file, label_file)| Sample {
                    image_file,
                    label_file,
                })
                .collect()
        }
        Pairing::ByStem => {
            let mut label_map = BTreeMap::new();
            for label_file in labels {
                let stem = file_stem(&label_file)?;
                if let Some(prev) = label_map.insert(stem, label_file.clone()) {
                    bail!(
                        "annotation files '{}' and '{}' share the same stem",
                        prev.display(),
                        label_file.display()
                    );
                }
            }

            let mut seen = BTreeSet::new();
            let mut samples = vec![];
            let mut unmatched_images = vec![];
            for image_file in images {
                let stem = file_stem(&image_file)?;
                ensure!(
                    seen.insert(stem.clone()),
                    "more than one image has the stem '{}'",
                    stem
                );
                match label_map.remove(&stem) {
                    Some(label_file) => samples.push(Sample {
                        image_file,
                        label_file,
                    }),
                    None => unmatched_images.push(image_file),
                }
            }

            let unmatched_labels: Vec<_> = label_map.into_values().collect();
            if !unmatched_images.is_empty() || !unmatched_labels.is_empty() {
                let names = |files: &[PathBuf]| {
                    files
                        .iter()
                        .map(|file| format!("'{}'", file.display()))
                        .join(", ")
                };
                bail!(
                    "unpaired files: images without annotations [{}], annotations without images [{}]",
                    names(&unmatched_images),
                    names(&unmatched_labels)
                );
            }
            samples
        }
    };
    Ok(samples)
}

fn file_stem(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| format_err!("invalid file name '{}'", path.display()))?;
    Ok(stem.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let dir = tempfile::tempdir()?;
            fs::create_dir(dir.path().join("images"))?;
            fs::create_dir(dir.path().join("labels"))?;
            Ok(Self { dir })
        }

        fn image_dir(&self) -> PathBuf {
            self.dir.path().join("images")
        }

        fn label_dir(&self) -> PathBuf {
            self.dir.path().join("labels")
        }

        fn add_image(&self, name: &str, height: i64, width: i64, value: i64) -> Result<()> {
            let image = Tensor::full(&[3, height, width], value, (Kind::Uint8, Device::Cpu));
            vision::image::save(&image, self.image_dir().join(name))?;
            Ok(())
        }

        fn add_label(&self, name: &str, text: &str) -> Result<()> {
            fs::write(self.label_dir().join(name), text)?;
            Ok(())
        }

        fn init(&self, size: usize) -> AssemblerInit {
            AssemblerInit::new(self.image_dir(), self.label_dir(), HW::from_hw([size, size]))
        }
    }

    #[test]
    fn assemble_masks() -> Result<()> {
        let fixture = Fixture::new()?;
        fixture.add_image("b.png", 64, 64, 51)?;
        fixture.add_image("a.png", 64, 64, 51)?;
        fixture.add_label("a.json", r#"[{"x": 32, "y": 32, "radius": 8}]"#)?;
        fixture.add_label("b.json", r#"[{"x": 10, "y": 10}]"#)?;

        let dataset = AssemblerInit {
            radius_policy: RadiusPolicy::DefaultZero,
            ..fixture.init(32)
        }
        .assemble()?;

        assert_eq!(dataset.len(), 2);
        assert!(dataset.pairs[0].image_file.ends_with("a.png"));
        assert!(dataset.pairs[1].label_file.ends_with("b.json"));

        let images = dataset.images_tensor();
        assert_eq!(images.size(), vec![2, 32, 32, 3]);
        assert_abs_diff_eq!(images.double_value(&[0, 3, 4, 1]), 0.2, epsilon = 1e-6);
        assert_eq!(dataset.images[0].orig_size(), HW::from_hw([64, 64]));

        let masks = dataset.masks_tensor()?;
        assert_eq!(masks.size(), vec![2, 32, 32, 1]);
        assert_eq!(masks.get(0).sum(Kind::Float).double_value(&[]), 49.0);
        assert_eq!(masks.get(1).sum(Kind::Float).double_value(&[]), 1.0);
        assert_eq!(masks.double_value(&[1, 5, 5, 0]), 1.0);
        assert!(dataset.boxes().is_none());
        Ok(())
    }

    #[test]
    fn annotation_size_overrides_image_size() -> Result<()> {
        let fixture = Fixture::new()?;
        fixture.add_image("slide.png", 32, 32, 0)?;
        fixture.add_label("slide.json", r#"[{"x": 64, "y": 32, "radius": 0}]"#)?;

        let dataset = AssemblerInit {
            annotation_size: Some(HW::from_hw([128, 128])),
            ..fixture.init(32)
        }
        .assemble()?;
        let masks = dataset.masks_tensor()?;
        assert_eq!(masks.double_value(&[0, 8, 16, 0]), 1.0);
        assert_eq!(masks.sum(Kind::Float).double_value(&[]), 1.0);
        Ok(())
    }

    #[test]
    fn symmetric_normalization() -> Result<()> {
        let fixture = Fixture::new()?;
        fixture.add_image("x.png", 16, 16, 51)?;
        fixture.add_label("x.json", "[]")?;

        let dataset = AssemblerInit {
            normalization: Normalization::SymmetricOne,
            ..fixture.init(16)
        }
        .assemble()?;
        assert_eq!(dataset.normalization, Normalization::SymmetricOne);
        assert_eq!(dataset.images[0].normalization(), Normalization::SymmetricOne);
        let value = dataset.images_tensor().double_value(&[0, 0, 0, 0]);
        assert_abs_diff_eq!(value, 51.0 / 127.5 - 1.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn unmatched_stems_are_reported() -> Result<()> {
        let fixture = Fixture::new()?;
        fixture.add_image("a.png", 8, 8, 0)?;
        fixture.add_image("b.png", 8, 8, 0)?;
        fixture.add_label("a.json", "[]")?;
        fixture.add_label("c.json", "[]")?;

        let err = fixture.init(8).assemble().unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("b.png"));
        assert!(message.contains("c.json"));
        Ok(())
    }

    #[test]
    fn positional_pairing() -> Result<()> {
        let fixture = Fixture::new()?;
        fixture.add_image("img_0.png", 8, 8, 0)?;
        fixture.add_image("img_1.png", 8, 8, 0)?;
        fixture.add_label("mask_0.json", "[]")?;
        fixture.add_label("mask_1.json", r#"[{"x": 1, "y": 1, "radius": 0}]"#)?;

        let init = AssemblerInit {
            pairing: Pairing::Positional,
            ..fixture.init(8)
        };
        let dataset = init.assemble()?;
        assert!(dataset.pairs[1].label_file.ends_with("mask_1.json"));
        assert_eq!(dataset.masks_tensor()?.get(1).sum(Kind::Float).double_value(&[]), 1.0);

        fixture.add_label("mask_2.json", "[]")?;
        assert!(init.assemble().is_err());
        Ok(())
    }

    #[test]
    fn missing_radius_names_the_file() -> Result<()> {
        let fixture = Fixture::new()?;
        fixture.add_image("core.png", 8, 8, 0)?;
        fixture.add_label("core.json", r#"[{"x": 1, "y": 1}]"#)?;

        let err = fixture.init(8).assemble().unwrap_err();
        assert!(format!("{:#}", err).contains("core.json"));
        Ok(())
    }

    #[test]
    fn assemble_boxes() -> Result<()> {
        let fixture = Fixture::new()?;
        fixture.add_image("a.png", 20, 20, 0)?;
        fixture.add_label(
            "a.json",
            r#"[{"x": 5, "y": 5, "radius": 2}, {"x": 15, "y": 15, "radius": 2}]"#,
        )?;

        let dataset = AssemblerInit {
            target: Target::Boxes {
                max_boxes: 1,
                pad_value: r64(0.0),
            },
            ..fixture.init(20)
        }
        .assemble()?;

        let batch = dataset.boxes().unwrap();
        assert_eq!(batch.boxes.size(), vec![1, 1, 4]);
        assert_eq!(batch.num_dropped, vec![1]);
        assert_abs_diff_eq!(batch.boxes.double_value(&[0, 0, 0]), 0.15, epsilon = 1e-6);
        assert_abs_diff_eq!(batch.boxes.double_value(&[0, 0, 3]), 0.35, epsilon = 1e-6);
        assert!(dataset.masks_tensor().is_err());
        Ok(())
    }

    #[test]
    fn assembler_config() -> Result<()> {
        let init: AssemblerInit = serde_json::from_str(
            r#"{
                "image_dir": "data/images",
                "label_dir": "data/labels",
                "target_size": [512, 512],
                "radius_policy": {"type": "DefaultFixed", "radius": 16.0},
                "target": {"type": "Boxes", "max_boxes": 100, "pad_value": 0.0}
            }"#,
        )?;
        assert_eq!(init.image_extensions, vec!["png".to_string()]);
        assert_eq!(init.pairing, Pairing::ByStem);
        assert_eq!(init.normalization, Normalization::ZeroOne);
        assert_eq!(init.annotation_size, None);
        assert_eq!(
            init.target,
            Target::Boxes {
                max_boxes: 100,
                pad_value: r64(0.0)
            }
        );
        Ok(())
    }
}
