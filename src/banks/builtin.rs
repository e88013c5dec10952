//! Built-in banks, compiled into the crate.

use crate::store::NamedBank;

/// A bank whose content is fixed at build time
#[derive(Debug, Clone, Copy)]
pub struct BuiltinBank {
    pub name: &'static str,
    pub content: &'static [&'static str],
}

impl BuiltinBank {
    pub fn to_named(&self) -> NamedBank {
        NamedBank::new(
            self.name,
            self.content.iter().map(|s| s.to_string()).collect(),
        )
    }
}

pub const SOLAR_SYSTEM: BuiltinBank = BuiltinBank {
    name: "solar-system",
    content: &[
        "The Sun contains more than 99 percent of the mass of the solar system.",
        "Mercury is the smallest planet and the closest to the Sun.",
        "Venus rotates backwards compared to most other planets.",
        "Mars has the tallest volcano in the solar system, Olympus Mons.",
        "Jupiter's Great Red Spot is a storm larger than Earth.",
        "Saturn's rings are made mostly of ice and rock.",
        "Uranus rotates on its side with an axial tilt of about 98 degrees.",
        "Neptune has the strongest winds measured on any planet.",
        "Light from the Sun takes about eight minutes to reach Earth.",
        "The Moon is slowly drifting away from Earth each year.",
    ],
};

pub const OCEAN_LIFE: BuiltinBank = BuiltinBank {
    name: "ocean-life",
    content: &[
        "Octopuses have three hearts and blue blood.",
        "Blue whales are the largest animals known to have ever lived.",
        "Sea otters hold hands while sleeping so they do not drift apart.",
        "Some jellyfish can revert to an earlier stage of their life cycle.",
        "Coral reefs are built by colonies of tiny animals called polyps.",
        "Sharks existed before trees appeared on land.",
        "The mantis shrimp can see more colors than humans.",
        "Seahorse fathers carry and give birth to their young.",
    ],
};

pub const COMPUTING: BuiltinBank = BuiltinBank {
    name: "computing",
    content: &[
        "The first computer bug was an actual moth found in a relay.",
        "Ada Lovelace wrote an algorithm for the Analytical Engine.",
        "The transistor replaced vacuum tubes in electronic computers.",
        "Unix time counts seconds since the first of January 1970.",
        "A byte has eight bits on almost every modern computer.",
        "The World Wide Web was proposed at CERN in 1989.",
        "Early hard drives stored only a few megabytes and filled a cabinet.",
    ],
};

/// Every built-in bank, in display order
pub const BUILTIN_BANKS: &[BuiltinBank] = &[SOLAR_SYSTEM, OCEAN_LIFE, COMPUTING];

/// Look up a built-in bank by name
pub fn builtin(name: &str) -> Option<&'static BuiltinBank> {
    BUILTIN_BANKS.iter().find(|b| b.name == name)
}

pub fn is_builtin(name: &str) -> bool {
    builtin(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_are_unique() {
        let mut names: Vec<&str> = BUILTIN_BANKS.iter().map(|b| b.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), BUILTIN_BANKS.len());
    }

    #[test]
    fn test_lookup() {
        assert!(is_builtin("ocean-life"));
        assert!(!is_builtin("ocean"));
        let bank = builtin("computing").unwrap().to_named();
        assert_eq!(bank.len(), COMPUTING.content.len());
        assert!(bank.content.iter().all(|e| !e.is_empty()));
    }
}
