//! Row/column digit draw.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{Digits, NumberAssignment, GRID_SIZE};
use crate::error::Result;

/// Two independent uniform permutations of 0..=9
pub fn draw() -> Result<NumberAssignment> {
    draw_with(&mut rand::thread_rng())
}

pub fn draw_with<R: Rng + ?Sized>(rng: &mut R) -> Result<NumberAssignment> {
    Ok(NumberAssignment {
        row_numbers: permutation(rng)?,
        col_numbers: permutation(rng)?,
    })
}

fn permutation<R: Rng + ?Sized>(rng: &mut R) -> Result<Digits> {
    let mut digits: [u8; GRID_SIZE] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
    digits.shuffle(rng);
    Digits::new(digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn is_permutation(d: &Digits) -> bool {
        let mut sorted = d.as_slice().to_vec();
        sorted.sort_unstable();
        sorted == (0..10).collect::<Vec<u8>>()
    }

    #[test]
    fn test_draw_yields_permutations() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = draw_with(&mut rng).unwrap();
            assert!(is_permutation(&n.row_numbers));
            assert!(is_permutation(&n.col_numbers));
        }
    }

    #[test]
    fn test_seeded_draw_is_reproducible() {
        let a = draw_with(&mut StdRng::seed_from_u64(42)).unwrap();
        let b = draw_with(&mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rows_and_cols_drawn_independently() {
        let mut rng = StdRng::seed_from_u64(1);
        let differs = (0..20)
            .map(|_| draw_with(&mut rng).unwrap())
            .any(|n| n.row_numbers != n.col_numbers);
        assert!(differs);
    }
}
