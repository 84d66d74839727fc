//! Win conditions and role helpers.
//!
//! Roles are free text. Only two names carry rules, compared
//! case-insensitively: `Mafia` (counted against everyone else) and
//! `Jester` (wins by being voted out).

use mafia_types::Player;

/// Winning team name when no Mafia remain.
pub const VILLAGERS: &str = "Villagers";

/// Winning team name when Mafia reach parity.
pub const MAFIA: &str = "Mafia";

/// Winning team name when the Jester is voted out.
pub const JESTER: &str = "Jester";

/// Whether `role` is the Mafia role.
pub fn is_mafia(role: Option<&str>) -> bool {
    role.is_some_and(|r| r.eq_ignore_ascii_case(MAFIA))
}

/// Whether `role` is the Jester role.
pub fn is_jester(role: Option<&str>) -> bool {
    role.is_some_and(|r| r.eq_ignore_ascii_case(JESTER))
}

/// Decide the winner from the authoritative alive flags.
///
/// Villagers win once no Mafia are alive; Mafia win once living Mafia are
/// at least as many as everyone else alive. Otherwise the game goes on.
pub fn determine_winner(players: &[Player]) -> Option<&'static str> {
    let (mafia_alive, others_alive) = players
        .iter()
        .filter(|p| p.is_alive)
        .fold((0_usize, 0_usize), |(mafia, others), p| {
            if is_mafia(p.role.as_deref()) {
                (mafia.saturating_add(1), others)
            } else {
                (mafia, others.saturating_add(1))
            }
        });

    if mafia_alive == 0 {
        Some(VILLAGERS)
    } else if mafia_alive >= others_alive {
        Some(MAFIA)
    } else {
        None
    }
}
