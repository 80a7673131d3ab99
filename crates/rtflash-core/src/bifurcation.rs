//! Bifurcation mode lookup
//!
//! How the retimer's lanes partition into logical links, indexed by the
//! bifurcation tag programmed in the global parameter register. The table
//! is constant data; there is no re-initialization path.

use crate::error::{Error, Result};

/// One link inside a bifurcation's link set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BifurcationLink {
    /// First lane of this link
    pub start_lane: u8,
    /// Link width in lanes
    pub width: u8,
    /// Link number inside the set
    pub link_id: u8,
}

/// The link set of one bifurcation mode
#[derive(Debug, Clone, Copy)]
pub struct Bifurcation {
    /// Links, ordered by start lane
    pub links: &'static [BifurcationLink],
}

const fn ln(start_lane: u8, width: u8, link_id: u8) -> BifurcationLink {
    BifurcationLink {
        start_lane,
        width,
        link_id,
    }
}

/// Link sets indexed by bifurcation tag
pub const BIFURCATION_MODES: [Bifurcation; 36] = [
    // x16
    Bifurcation { links: &[ln(0, 16, 0)] },
    // x8
    Bifurcation { links: &[ln(0, 8, 0)] },
    // x4
    Bifurcation { links: &[ln(0, 4, 0)] },
    // x8x8
    Bifurcation { links: &[ln(0, 8, 0), ln(8, 8, 1)] },
    // x4x4x8
    Bifurcation { links: &[ln(0, 4, 0), ln(4, 4, 1), ln(8, 8, 2)] },
    // x8x4x4
    Bifurcation { links: &[ln(0, 8, 0), ln(8, 4, 1), ln(12, 4, 2)] },
    // x4x4x4x4
    Bifurcation { links: &[ln(0, 4, 0), ln(4, 4, 1), ln(8, 4, 2), ln(12, 4, 3)] },
    // x2x2x2x2x2x2x2x2
    Bifurcation {
        links: &[
            ln(0, 2, 0),
            ln(2, 2, 1),
            ln(4, 2, 2),
            ln(6, 2, 3),
            ln(8, 2, 4),
            ln(10, 2, 5),
            ln(12, 2, 6),
            ln(14, 2, 7),
        ],
    },
    // x2x2x4x8
    Bifurcation { links: &[ln(0, 2, 0), ln(2, 2, 1), ln(4, 4, 2), ln(8, 8, 3)] },
    // x4x2x2x8
    Bifurcation { links: &[ln(0, 4, 0), ln(4, 2, 1), ln(6, 2, 2), ln(8, 8, 3)] },
    // x8x4x2x2
    Bifurcation { links: &[ln(0, 8, 0), ln(8, 4, 1), ln(12, 2, 2), ln(14, 2, 3)] },
    // x8x2x2x4
    Bifurcation { links: &[ln(0, 8, 0), ln(8, 2, 1), ln(10, 2, 2), ln(12, 4, 3)] },
    // x8x2x2x2x2
    Bifurcation {
        links: &[ln(0, 8, 0), ln(8, 2, 1), ln(10, 2, 2), ln(12, 2, 3), ln(14, 2, 4)],
    },
    // x2x2x2x2x8
    Bifurcation {
        links: &[ln(0, 2, 0), ln(2, 2, 1), ln(4, 2, 2), ln(6, 2, 3), ln(8, 8, 4)],
    },
    // x4x4x4x2x2
    Bifurcation {
        links: &[ln(0, 4, 0), ln(4, 4, 1), ln(8, 4, 2), ln(12, 2, 3), ln(14, 2, 4)],
    },
    // x4x4x2x2x4
    Bifurcation {
        links: &[ln(0, 4, 0), ln(4, 4, 1), ln(8, 2, 2), ln(10, 2, 3), ln(12, 4, 4)],
    },
    // x4x2x2x4x4
    Bifurcation {
        links: &[ln(0, 4, 0), ln(4, 2, 1), ln(6, 2, 2), ln(8, 4, 3), ln(12, 4, 4)],
    },
    // x2x2x4x4x4
    Bifurcation {
        links: &[ln(0, 2, 0), ln(2, 2, 1), ln(4, 4, 2), ln(8, 4, 3), ln(12, 4, 4)],
    },
    // x4x4x2x2x2x2
    Bifurcation {
        links: &[
            ln(0, 4, 0),
            ln(4, 4, 1),
            ln(8, 2, 2),
            ln(10, 2, 3),
            ln(12, 2, 4),
            ln(14, 2, 5),
        ],
    },
    // x4x2x2x4x2x2
    Bifurcation {
        links: &[
            ln(0, 4, 0),
            ln(4, 2, 1),
            ln(6, 2, 2),
            ln(8, 4, 3),
            ln(12, 2, 4),
            ln(14, 2, 5),
        ],
    },
    // x4x2x2x2x2x4
    Bifurcation {
        links: &[
            ln(0, 4, 0),
            ln(4, 2, 1),
            ln(6, 2, 2),
            ln(8, 2, 3),
            ln(10, 2, 4),
            ln(12, 4, 5),
        ],
    },
    // x2x2x4x4x2x2
    Bifurcation {
        links: &[
            ln(0, 2, 0),
            ln(2, 2, 1),
            ln(4, 4, 2),
            ln(8, 4, 3),
            ln(12, 2, 4),
            ln(14, 2, 5),
        ],
    },
    // x2x2x4x2x2x4
    Bifurcation {
        links: &[
            ln(0, 2, 0),
            ln(2, 2, 1),
            ln(4, 4, 2),
            ln(8, 2, 3),
            ln(10, 2, 4),
            ln(12, 4, 5),
        ],
    },
    // x4x4x4x4x2x2
    Bifurcation {
        links: &[
            ln(0, 4, 0),
            ln(4, 4, 1),
            ln(8, 4, 2),
            ln(12, 4, 3),
            ln(16, 2, 4),
            ln(18, 2, 5),
        ],
    },
    // x4x2x2x2x2x2x2
    Bifurcation {
        links: &[
            ln(0, 4, 0),
            ln(4, 2, 1),
            ln(6, 2, 2),
            ln(8, 2, 3),
            ln(10, 2, 4),
            ln(12, 2, 5),
            ln(14, 2, 6),
        ],
    },
    // x2x2x4x2x2x2x2
    Bifurcation {
        links: &[
            ln(0, 2, 0),
            ln(2, 2, 1),
            ln(4, 4, 2),
            ln(8, 2, 3),
            ln(10, 2, 4),
            ln(12, 2, 5),
            ln(14, 2, 6),
        ],
    },
    // x2x2x2x2x4x2x2
    Bifurcation {
        links: &[
            ln(0, 2, 0),
            ln(2, 2, 1),
            ln(4, 2, 2),
            ln(6, 2, 3),
            ln(8, 4, 4),
            ln(12, 2, 5),
            ln(14, 2, 6),
        ],
    },
    // x2x2x2x2x2x2x4
    Bifurcation {
        links: &[
            ln(0, 2, 0),
            ln(2, 2, 1),
            ln(4, 2, 2),
            ln(6, 2, 3),
            ln(8, 2, 4),
            ln(10, 2, 5),
            ln(12, 4, 6),
        ],
    },
    // x4x4
    Bifurcation { links: &[ln(0, 4, 0), ln(4, 4, 1)] },
    // x4x2x2
    Bifurcation { links: &[ln(0, 4, 0), ln(4, 2, 1), ln(6, 2, 2)] },
    // x2x2x4
    Bifurcation { links: &[ln(0, 2, 0), ln(2, 2, 1), ln(4, 4, 2)] },
    // x2x2x2x2
    Bifurcation { links: &[ln(0, 2, 0), ln(2, 2, 1), ln(4, 2, 2), ln(6, 2, 3)] },
    // x2x2
    Bifurcation { links: &[ln(0, 2, 0), ln(2, 2, 1)] },
    // x4x8x4
    Bifurcation { links: &[ln(0, 4, 0), ln(4, 8, 1), ln(12, 4, 2)] },
    // x2
    Bifurcation { links: &[ln(0, 2, 0)] },
    // x1
    Bifurcation { links: &[ln(0, 1, 0)] },
];

/// Look up the link that starts at `start_lane` in the given mode
pub fn link_for_start_lane(mode: u8, start_lane: u8) -> Result<BifurcationLink> {
    let bifurcation = BIFURCATION_MODES
        .get(mode as usize)
        .ok_or(Error::InvalidArgument)?;
    bifurcation
        .links
        .iter()
        .find(|l| l.start_lane == start_lane)
        .copied()
        .ok_or(Error::LinkConfigInvalid)
}
