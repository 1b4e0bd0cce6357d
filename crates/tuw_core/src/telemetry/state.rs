//! Decoded game-state snapshot

use serde::{Deserialize, Serialize};

use super::flags::{
    flag_names, ButtonFlags, CollectionFlags, ControlFlags, DirectionFlags, StateChangeFlags,
    StatusFlags,
};

/// Player state-machine code
///
/// Codes outside the known range are kept verbatim in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    Normal,
    Climb,
    Dash,
    Swim,
    /// Green bubble
    Boost,
    /// Red bubble
    RedDash,
    HitSquash,
    Launch,
    Pickup,
    DreamDash,
    SummitLaunch,
    Dummy,
    IntroWalk,
    IntroJump,
    IntroRespawn,
    IntroWakeUp,
    BirdDashTutorial,
    Frozen,
    ReflectionFall,
    StarFly,
    TempleFall,
    CassetteFly,
    Attract,
    Unknown(i32),
}

impl MovementState {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => MovementState::Normal,
            1 => MovementState::Climb,
            2 => MovementState::Dash,
            3 => MovementState::Swim,
            4 => MovementState::Boost,
            5 => MovementState::RedDash,
            6 => MovementState::HitSquash,
            7 => MovementState::Launch,
            8 => MovementState::Pickup,
            9 => MovementState::DreamDash,
            10 => MovementState::SummitLaunch,
            11 => MovementState::Dummy,
            12 => MovementState::IntroWalk,
            13 => MovementState::IntroJump,
            14 => MovementState::IntroRespawn,
            15 => MovementState::IntroWakeUp,
            16 => MovementState::BirdDashTutorial,
            17 => MovementState::Frozen,
            18 => MovementState::ReflectionFall,
            19 => MovementState::StarFly,
            20 => MovementState::TempleFall,
            21 => MovementState::CassetteFly,
            22 => MovementState::Attract,
            other => MovementState::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            MovementState::Normal => 0,
            MovementState::Climb => 1,
            MovementState::Dash => 2,
            MovementState::Swim => 3,
            MovementState::Boost => 4,
            MovementState::RedDash => 5,
            MovementState::HitSquash => 6,
            MovementState::Launch => 7,
            MovementState::Pickup => 8,
            MovementState::DreamDash => 9,
            MovementState::SummitLaunch => 10,
            MovementState::Dummy => 11,
            MovementState::IntroWalk => 12,
            MovementState::IntroJump => 13,
            MovementState::IntroRespawn => 14,
            MovementState::IntroWakeUp => 15,
            MovementState::BirdDashTutorial => 16,
            MovementState::Frozen => 17,
            MovementState::ReflectionFall => 18,
            MovementState::StarFly => 19,
            MovementState::TempleFall => 20,
            MovementState::CassetteFly => 21,
            MovementState::Attract => 22,
            MovementState::Unknown(code) => *code,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MovementState::Unknown(_))
    }
}

/// Optional record trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer {
    /// Declared trailer length, payload bytes included
    pub len: u8,
    pub collection: CollectionFlags,
    pub state_change: StateChangeFlags,
}

/// One decoded telemetry record
///
/// Immutable once decoded. Positions are in the game's own room-space
/// coordinates; consumers that re-origin them for drawing do so on copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Writer-side counter; only used to detect changes
    pub sequence: u32,
    /// Wall-clock seconds since the Unix epoch
    pub timestamp: f64,
    /// In-game elapsed time
    pub game_time: f64,
    pub deaths: i32,
    pub room: String,

    pub xpos: f32,
    pub ypos: f32,
    pub xvel: f32,
    pub yvel: f32,
    pub stamina: f32,
    pub xlift: f32,
    pub ylift: f32,
    pub state: MovementState,
    /// Dashes remaining
    pub dashes: i32,
    pub control: ControlFlags,
    pub status: StatusFlags,

    pub buttons: ButtonFlags,
    pub directions: DirectionFlags,
    pub xaim: f32,
    pub yaim: f32,

    pub trailer: Option<Trailer>,

    /// Null-terminated strings following the fixed sections
    pub strings: Vec<String>,
}

impl GameState {
    pub fn is_dead(&self) -> bool {
        self.control.contains(ControlFlags::DEAD)
    }

    pub fn is_paused(&self) -> bool {
        self.control.contains(ControlFlags::PAUSED)
    }

    pub fn position(&self) -> (f32, f32) {
        (self.xpos, self.ypos)
    }

    /// Collection flags; empty when the record had no trailer
    pub fn collection(&self) -> CollectionFlags {
        self.trailer.map(|t| t.collection).unwrap_or_default()
    }

    /// State-change flags; empty when the record had no trailer
    pub fn state_change(&self) -> StateChangeFlags {
        self.trailer.map(|t| t.state_change).unwrap_or_default()
    }

    pub fn chapter(&self) -> Option<&str> {
        self.strings.first().map(String::as_str)
    }

    pub fn map(&self) -> Option<&str> {
        self.strings.get(1).map(String::as_str)
    }

    /// Session flag names active at this record (strings after map/chapter)
    pub fn session_flags(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().skip(2).map(String::as_str)
    }

    /// Every named flag set on this record, across all flag sets, plus the
    /// active session flag names.
    pub fn active_flag_names(&self) -> Vec<String> {
        let collection = self.collection();
        let state_change = self.state_change();

        let mut names: Vec<String> = flag_names(&self.control)
            .chain(flag_names(&self.status))
            .chain(flag_names(&self.buttons))
            .chain(flag_names(&self.directions))
            .chain(flag_names(&collection))
            .chain(flag_names(&state_change))
            .collect();
        names.extend(self.session_flags().map(str::to_string));
        names
    }

    /// Squared distance between the positions of two states
    pub fn distance_sq(&self, other: &GameState) -> f64 {
        let dx = self.xpos as f64 - other.xpos as f64;
        let dy = self.ypos as f64 - other.ypos as f64;
        dx * dx + dy * dy
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            sequence: 0,
            timestamp: 0.0,
            game_time: 0.0,
            deaths: 0,
            room: String::new(),
            xpos: 0.0,
            ypos: 0.0,
            xvel: 0.0,
            yvel: 0.0,
            stamina: 0.0,
            xlift: 0.0,
            ylift: 0.0,
            state: MovementState::Normal,
            dashes: 0,
            control: ControlFlags::empty(),
            status: StatusFlags::empty(),
            buttons: ButtonFlags::empty(),
            directions: DirectionFlags::empty(),
            xaim: 0.0,
            yaim: 0.0,
            trailer: None,
            strings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_state_codes() {
        for code in 0..=22 {
            let state = MovementState::from_code(code);
            assert!(state.is_known());
            assert_eq!(state.code(), code);
        }
    }

    #[test]
    fn test_unknown_movement_state_preserved() {
        let state = MovementState::from_code(57);
        assert_eq!(state, MovementState::Unknown(57));
        assert_eq!(state.code(), 57);
        assert!(!state.is_known());
    }

    #[test]
    fn test_missing_trailer_defaults_empty() {
        let state = GameState::default();
        assert!(state.collection().is_empty());
        assert!(state.state_change().is_empty());
    }

    #[test]
    fn test_active_flag_names() {
        let state = GameState {
            control: ControlFlags::DEAD,
            buttons: ButtonFlags::JUMP,
            trailer: Some(Trailer {
                len: 2,
                collection: CollectionFlags::KEY,
                state_change: StateChangeFlags::empty(),
            }),
            strings: vec!["1".into(), "Celeste/1-ForsakenCity".into(), "door_open".into()],
            ..Default::default()
        };

        let names = state.active_flag_names();
        assert_eq!(names, vec!["dead", "jump", "key", "door_open"]);
        assert_eq!(state.chapter(), Some("1"));
        assert_eq!(state.map(), Some("Celeste/1-ForsakenCity"));
    }
}
