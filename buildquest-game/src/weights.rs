use rand::Rng;

/// Cumulative-weight roll over an explicit `(tag, weight)` table.
///
/// Returns `None` when the table is empty or every weight is zero.
pub(crate) fn choose_weighted<T: Copy, R: Rng + ?Sized>(
    weights: &[(T, u32)],
    rng: &mut R,
) -> Option<T> {
    let total_weight: u32 = weights.iter().map(|(_, weight)| *weight).sum();
    if total_weight == 0 {
        return None;
    }

    let roll = rng.gen_range(0..total_weight);
    let mut current = 0;
    for (tag, weight) in weights {
        current += *weight;
        if roll < current {
            return Some(*tag);
        }
    }

    weights.first().map(|(tag, _)| *tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn zero_weight_tags_are_never_drawn() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let table = [('a', 0), ('b', 3), ('c', 0)];
        for _ in 0..200 {
            assert_eq!(choose_weighted(&table, &mut rng), Some('b'));
        }
    }

    #[test]
    fn empty_table_yields_nothing() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        assert_eq!(choose_weighted::<char, _>(&[], &mut rng), None);
        assert_eq!(choose_weighted(&[('a', 0)], &mut rng), None);
    }

    #[test]
    fn heavier_tags_win_more_often() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let table = [(0_usize, 1), (1, 9)];
        let mut hits = [0_u32; 2];
        for _ in 0..2_000 {
            let tag = choose_weighted(&table, &mut rng).expect("non-empty table");
            hits[tag] += 1;
        }
        assert!(hits[1] > hits[0] * 4);
    }
}
