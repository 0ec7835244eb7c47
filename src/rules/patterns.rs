/// Predefined patterns for seeding the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// A 2x2 still life
    Block,
    /// A period-2 oscillator
    Blinker,
    /// A period-2 oscillator
    Toad,
    /// A diagonal spaceship
    Glider,
    /// A horizontal spaceship
    LightweightSpaceship,
    /// A pattern that emits gliders indefinitely
    GosperGliderGun,
}

impl Pattern {
    pub const ALL: [Pattern; 6] = [
        Pattern::Block,
        Pattern::Blinker,
        Pattern::Toad,
        Pattern::Glider,
        Pattern::LightweightSpaceship,
        Pattern::GosperGliderGun,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pattern::Block => "block",
            Pattern::Blinker => "blinker",
            Pattern::Toad => "toad",
            Pattern::Glider => "glider",
            Pattern::LightweightSpaceship => "lwss",
            Pattern::GosperGliderGun => "gosper",
        }
    }

    /// Looks a pattern up by its [`name`](Self::name), ignoring case.
    pub fn from_name(name: &str) -> Option<Pattern> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|pattern| pattern.name().eq_ignore_ascii_case(name))
    }

    /// Live cells relative to the anchor position.
    pub fn offsets(&self) -> &'static [(i32, i32)] {
        match self {
            Pattern::Block => &[(0, 0), (1, 0), (0, 1), (1, 1)],
            Pattern::Blinker => &[(0, -1), (0, 0), (0, 1)],
            Pattern::Toad => &[(-1, 0), (0, 0), (1, 0), (-2, 1), (-1, 1), (0, 1)],
            Pattern::Glider => &[(0, 1), (1, 2), (2, 0), (2, 1), (2, 2)],
            Pattern::LightweightSpaceship => &[
                (0, 1), (0, 3),
                (1, 0),
                (2, 0),
                (3, 0), (3, 3),
                (4, 0), (4, 1), (4, 2),
            ],
            Pattern::GosperGliderGun => &[
                // Left block
                (1, 5), (1, 6),
                (2, 5), (2, 6),

                // Left ship
                (11, 5), (11, 6), (11, 7),
                (12, 4), (12, 8),
                (13, 3), (13, 9),
                (14, 3), (14, 9),
                (15, 6),
                (16, 4), (16, 8),
                (17, 5), (17, 6), (17, 7),
                (18, 6),

                // Right ship
                (21, 3), (21, 4), (21, 5),
                (22, 3), (22, 4), (22, 5),
                (23, 2), (23, 6),
                (25, 1), (25, 2), (25, 6), (25, 7),

                // Right block
                (35, 3), (35, 4),
                (36, 3), (36, 4),
            ],
        }
    }
}
