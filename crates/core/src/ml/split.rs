//! Seeded, stratified train/test partitioning.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::discount::DiscountClass;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnderpopulatedClass {
    pub class: DiscountClass,
    pub count: usize,
}

/// Splits row indices so each class keeps its share in both partitions.
///
/// Every present class contributes at least one row to each side, so a class with a
/// single sample cannot be split and is reported back.
pub fn stratified_split(
    labels: &[DiscountClass],
    test_fraction: f64,
    seed: u64,
) -> Result<SplitIndices, UnderpopulatedClass> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in DiscountClass::ALL {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == class)
            .map(|(idx, _)| idx)
            .collect();
        if members.is_empty() {
            continue;
        }
        if members.len() < 2 {
            return Err(UnderpopulatedClass { class, count: members.len() });
        }

        members.shuffle(&mut rng);
        let test_count =
            ((members.len() as f64 * test_fraction).round() as usize).clamp(1, members.len() - 1);
        test.extend_from_slice(&members[..test_count]);
        train.extend_from_slice(&members[test_count..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(SplitIndices { train, test })
}
