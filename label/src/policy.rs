use crate::{common::*, Core, CoreRecord};

/// How to resolve annotations that come without a radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RadiusPolicy {
    /// A missing radius is zero, i.e. the core is a single point.
    DefaultZero,
    /// A missing radius takes this value in annotation pixel units.
    DefaultFixed { radius: R64 },
    /// A missing radius is an error.
    RequireExplicit,
}

impl Default for RadiusPolicy {
    fn default() -> Self {
        Self::RequireExplicit
    }
}

impl RadiusPolicy {
    pub fn resolve(&self, record: &CoreRecord) -> Result<Core> {
        let CoreRecord { x, y, radius } = *record;
        let radius = match (radius, self) {
            (Some(radius), _) => radius,
            (None, Self::DefaultZero) => 0.0,
            (None, Self::DefaultFixed { radius }) => radius.raw(),
            (None, Self::RequireExplicit) => {
                return Err(format_err!("the annotation at ({}, {}) has no radius", x, y))
            }
        };
        Core::try_new(x, y, radius)
    }

    /// Resolves a whole annotation file, keeping the order.
    pub fn resolve_all(&self, records: &[CoreRecord]) -> Result<Vec<Core>> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.resolve(record)
                    .with_context(|| format!("invalid annotation at index {}", index))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64) -> CoreRecord {
        CoreRecord { x, y, radius: None }
    }

    #[test]
    fn radius_policies() {
        let record = point(3.0, 4.0);
        let zero = RadiusPolicy::DefaultZero.resolve(&record).unwrap();
        assert_eq!(zero.radius(), 0.0);

        let fixed = RadiusPolicy::DefaultFixed { radius: r64(16.0) }
            .resolve(&record)
            .unwrap();
        assert_eq!(fixed.radius(), 16.0);
        assert_eq!((fixed.x(), fixed.y()), (3.0, 4.0));

        assert!(RadiusPolicy::RequireExplicit.resolve(&record).is_err());
    }

    #[test]
    fn explicit_radius_wins() {
        let record = CoreRecord {
            x: 1.0,
            y: 2.0,
            radius: Some(7.0),
        };
        let policy = RadiusPolicy::DefaultFixed { radius: r64(16.0) };
        assert_eq!(policy.resolve(&record).unwrap().radius(), 7.0);
    }

    #[test]
    fn negative_radius_is_rejected() {
        let records = [
            point(0.0, 0.0),
            CoreRecord {
                x: 1.0,
                y: 1.0,
                radius: Some(-2.0),
            },
        ];
        let err = RadiusPolicy::DefaultZero.resolve_all(&records).unwrap_err();
        assert!(format!("{:#}", err).contains("index 1"));
    }

    #[test]
    fn policy_config() {
        let policy: RadiusPolicy =
            serde_json::from_str(r#"{"type": "DefaultFixed", "radius": 16.0}"#).unwrap();
        assert_eq!(policy, RadiusPolicy::DefaultFixed { radius: r64(16.0) });
        let policy: RadiusPolicy = serde_json::from_str(r#"{"type": "DefaultZero"}"#).unwrap();
        assert_eq!(policy, RadiusPolicy::DefaultZero);
    }
}
