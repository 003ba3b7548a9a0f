//! Lead-ball allocation per end.

use crate::state::match_state::Side;

/// Balls held by the side throwing first in an end (includes the lead ball).
pub const LEAD_BALLS: u8 = 7;
/// Balls held by the side throwing second in an end.
pub const STANDARD_BALLS: u8 = 6;
/// Upper bound for any side's ball count.
pub const MAX_BALLS: u8 = LEAD_BALLS;

/// Number of balls `side` holds at the start of end `end_number`.
///
/// Red leads on odd ends and blue on even ends, so the two sides always sum to 13.
pub fn lead_ball_count(end_number: u32, side: Side) -> u8 {
    let red_leads = end_number % 2 == 1;
    match (side, red_leads) {
        (Side::Red, true) | (Side::Blue, false) => LEAD_BALLS,
        _ => STANDARD_BALLS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_always_sum_to_thirteen() {
        for end in 1..=64 {
            assert_eq!(
                lead_ball_count(end, Side::Red) + lead_ball_count(end, Side::Blue),
                13,
                "end {end}"
            );
        }
    }

    #[test]
    fn lead_alternates_with_parity() {
        assert_eq!(lead_ball_count(1, Side::Red), 7);
        assert_eq!(lead_ball_count(1, Side::Blue), 6);
        assert_eq!(lead_ball_count(2, Side::Red), 6);
        assert_eq!(lead_ball_count(2, Side::Blue), 7);

        for end in 1..=20 {
            let red_leads_now = lead_ball_count(end, Side::Red) == LEAD_BALLS;
            let red_leads_next = lead_ball_count(end + 1, Side::Red) == LEAD_BALLS;
            assert_ne!(red_leads_now, red_leads_next);
        }
    }
}
