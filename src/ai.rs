// Probability-based targeting over the opponent's redacted board.

use rand::Rng;

use crate::{board::BoardView, common::CellStatus, config::BOARD_SIZE, ship::Orientation};

const GRID_SIZE: usize = BOARD_SIZE;

/// Probability matrix indexed `[row][col]`.
pub type Pdf = [[f64; GRID_SIZE]; GRID_SIZE];

/// Compute a probability density over all unresolved squares given the
/// opponent view (hits and misses) and the lengths of ships still afloat. Each
/// entry sums the relative likelihood of a ship segment occupying that square.
pub fn calc_pdf(view: &BoardView, remaining_lengths: &[usize]) -> Pdf {
    let mut matrix = [[0.0f64; GRID_SIZE]; GRID_SIZE];

    for &len in remaining_lengths.iter() {
        if len == 0 || len > GRID_SIZE {
            continue;
        }

        for orient in [Orientation::Horizontal, Orientation::Vertical] {
            let max_row = if matches!(orient, Orientation::Vertical) {
                GRID_SIZE - len + 1
            } else {
                GRID_SIZE
            };
            let max_col = if matches!(orient, Orientation::Horizontal) {
                GRID_SIZE - len + 1
            } else {
                GRID_SIZE
            };
            for r in 0..max_row {
                for c in 0..max_col {
                    let mut valid = true;
                    let mut n_hits = 0usize;
                    for k in 0..len {
                        let (rr, cc) = segment(orient, r, c, k);
                        match view[rr][cc] {
                            CellStatus::Miss => {
                                valid = false;
                                break;
                            }
                            CellStatus::Hit => n_hits += 1,
                            CellStatus::Empty | CellStatus::Ship => {}
                        }
                    }
                    if !valid {
                        continue;
                    }

                    // Placements covering observed hits get far more weight so
                    // squares next to a wounded ship stand out.
                    const HIT_BIAS: f64 = 10.0;
                    let weight = if n_hits == 0 {
                        1.0
                    } else {
                        HIT_BIAS.powi(n_hits as i32)
                    };
                    for k in 0..len {
                        let (rr, cc) = segment(orient, r, c, k);
                        if !view[rr][cc].is_resolved() {
                            matrix[rr][cc] += weight;
                        }
                    }
                }
            }
        }
    }

    normalize(matrix, view)
}

fn segment(orient: Orientation, r: usize, c: usize, k: usize) -> (usize, usize) {
    match orient {
        Orientation::Horizontal => (r, c + k),
        Orientation::Vertical => (r + k, c),
    }
}

/// Normalize to a distribution. With no information left, fall back to a
/// uniform spread over unresolved squares.
fn normalize(mut matrix: Pdf, view: &BoardView) -> Pdf {
    let total: f64 = matrix.iter().flatten().sum();
    if total == 0.0 {
        let open = view.iter().flatten().filter(|s| !s.is_resolved()).count();
        if open == 0 {
            return matrix;
        }
        let uniform = 1.0 / open as f64;
        for r in 0..GRID_SIZE {
            for c in 0..GRID_SIZE {
                matrix[r][c] = if view[r][c].is_resolved() { 0.0 } else { uniform };
            }
        }
        return matrix;
    }
    for row in matrix.iter_mut() {
        for v in row.iter_mut() {
            *v /= total;
        }
    }
    matrix
}

/// Sample a coordinate from a probability matrix using a temperature parameter.
/// Returns `None` when every square has zero weight.
pub fn sample_pdf<R: Rng + ?Sized>(pdf: &Pdf, temperature: f64, rng: &mut R) -> Option<(usize, usize)> {
    let mut adjusted = [[0.0f64; GRID_SIZE]; GRID_SIZE];
    let mut total = 0.0;
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            let v = pdf[r][c].powf(1.0 / temperature);
            adjusted[r][c] = v;
            total += v;
        }
    }
    if total == 0.0 {
        return None;
    }
    let mut cumulative = 0.0;
    let threshold: f64 = rng.random_range(0.0..total);
    let mut last_positive = None;
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            if adjusted[r][c] > 0.0 {
                last_positive = Some((r, c));
            }
            cumulative += adjusted[r][c];
            if threshold < cumulative {
                return Some((r, c));
            }
        }
    }
    last_positive
}

/// Calculate the PDF and immediately pick a target.
pub fn calc_pdf_and_guess<R: Rng + ?Sized>(
    view: &BoardView,
    remaining_lengths: &[usize],
    rng: &mut R,
) -> Option<(usize, usize)> {
    let pdf = calc_pdf(view, remaining_lengths);
    // Lower temperature biases sampling towards likely ship squares.
    sample_pdf(&pdf, 0.5, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn open_view() -> BoardView {
        [[CellStatus::Empty; GRID_SIZE]; GRID_SIZE]
    }

    #[test]
    fn pdf_sums_to_one() {
        let pdf = calc_pdf(&open_view(), &[4, 3, 2, 1]);
        let total: f64 = pdf.iter().flatten().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resolved_squares_get_no_weight() {
        let mut view = open_view();
        view[0][0] = CellStatus::Miss;
        view[5][5] = CellStatus::Hit;
        let pdf = calc_pdf(&view, &[3]);
        assert_eq!(pdf[0][0], 0.0);
        assert_eq!(pdf[5][5], 0.0);
    }

    #[test]
    fn neighbours_of_a_hit_are_favoured() {
        let mut view = open_view();
        view[5][5] = CellStatus::Hit;
        let pdf = calc_pdf(&view, &[2]);
        assert!(pdf[5][6] > pdf[0][0]);
        assert!(pdf[4][5] > pdf[9][9]);
    }

    #[test]
    fn sampling_never_picks_resolved_squares() {
        let mut view = open_view();
        for c in 0..GRID_SIZE {
            view[0][c] = CellStatus::Miss;
        }
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..200 {
            let (r, _) = calc_pdf_and_guess(&view, &[1], &mut rng).unwrap();
            assert_ne!(r, 0);
        }
    }

    #[test]
    fn fully_resolved_board_yields_nothing() {
        let view = [[CellStatus::Miss; GRID_SIZE]; GRID_SIZE];
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(calc_pdf_and_guess(&view, &[1], &mut rng), None);
    }
}
