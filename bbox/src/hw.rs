use crate::common::*;

/// Size in height and width.
///
/// The serialized form is the `[h, w]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    try_from = "[T; 2]",
    into = "[T; 2]",
    bound(
        serialize = "T: Serialize + Copy",
        deserialize = "T: Deserialize<'de> + Copy + Num + PartialOrd"
    )
)]
pub struct HW<T> {
    h: T,
    w: T,
}

impl<T> HW<T> {
    pub fn try_cast<U>(self) -> Option<HW<U>>
    where
        T: ToPrimitive,
        U: NumCast,
    {
        Some(HW {
            h: U::from(self.h)?,
            w: U::from(self.w)?,
        })
    }

    pub fn cast<U>(self) -> HW<U>
    where
        T: ToPrimitive,
        U: NumCast,
    {
        self.try_cast().unwrap()
    }
}

impl<T> HW<T>
where
    T: Num + PartialOrd + Copy,
{
    pub fn try_from_hw(hw: [T; 2]) -> Result<Self> {
        let [h, w] = hw;
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            "height and width parameters must be non-negative"
        );
        Ok(Self { h, w })
    }

    pub fn from_hw(hw: [T; 2]) -> Self {
        Self::try_from_hw(hw).unwrap()
    }

    pub fn is_positive(&self) -> bool {
        let zero = T::zero();
        self.h > zero && self.w > zero
    }

    pub fn area(&self) -> T {
        self.w * self.h
    }

    pub fn w(&self) -> T {
        self.w
    }

    pub fn h(&self) -> T {
        self.h
    }

    pub fn hw(&self) -> [T; 2] {
        [self.h, self.w]
    }
}

impl<T> TryFrom<[T; 2]> for HW<T>
where
    T: Num + PartialOrd + Copy,
{
    type Error = anyhow::Error;

    fn try_from(hw: [T; 2]) -> Result<Self, Self::Error> {
        Self::try_from_hw(hw)
    }
}

impl<T> From<HW<T>> for [T; 2] {
    fn from(from: HW<T>) -> Self {
        let HW { h, w } = from;
        [h, w]
    }
}
