//! Referendum track catalogue, used to name tracks in logs and reports

use super::types::Domain;
use crate::topology::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    pub id: u16,
    pub name: &'static str,
    /// Lowest fellowship rank that may vote; 0 for token governance.
    pub min_rank: u8,
}

const fn track(id: u16, name: &'static str, min_rank: u8) -> Track {
    Track { id, name, min_rank }
}

/// OpenGov tracks, identical on Polkadot and Kusama.
pub const GOVERNANCE_TRACKS: &[Track] = &[
    track(0, "Root", 0),
    track(1, "WhitelistedCaller", 0),
    track(2, "WishForChange", 0),
    track(10, "StakingAdmin", 0),
    track(11, "Treasurer", 0),
    track(12, "LeaseAdmin", 0),
    track(13, "FellowshipAdmin", 0),
    track(14, "GeneralAdmin", 0),
    track(15, "AuctionAdmin", 0),
    track(20, "ReferendumCanceller", 0),
    track(21, "ReferendumKiller", 0),
    track(30, "SmallTipper", 0),
    track(31, "BigTipper", 0),
    track(32, "SmallSpender", 0),
    track(33, "MediumSpender", 0),
    track(34, "BigSpender", 0),
];

/// Fellowship tracks of the Polkadot Collectives chain.
pub const POLKADOT_FELLOWSHIP_TRACKS: &[Track] = &[
    track(1, "Members", 1),
    track(2, "Fellowship2Dan", 2),
    track(3, "Fellows", 3),
    track(4, "Architects", 4),
    track(5, "Fellowship5Dan", 5),
    track(6, "Fellowship6Dan", 6),
    track(7, "Masters", 7),
    track(8, "Fellowship8Dan", 8),
    track(9, "Fellowship9Dan", 9),
    track(11, "RetainAt1Dan", 1),
    track(12, "RetainAt2Dan", 2),
    track(13, "RetainAt3Dan", 3),
    track(14, "RetainAt4Dan", 4),
    track(15, "RetainAt5Dan", 5),
    track(16, "RetainAt6Dan", 6),
    track(21, "PromoteTo1Dan", 1),
    track(22, "PromoteTo2Dan", 2),
    track(23, "PromoteTo3Dan", 3),
    track(24, "PromoteTo4Dan", 4),
    track(25, "PromoteTo5Dan", 5),
    track(26, "PromoteTo6Dan", 6),
    track(31, "FastPromoteTo1Dan", 1),
    track(32, "FastPromoteTo2Dan", 2),
    track(33, "FastPromoteTo3Dan", 3),
];

/// Fellowship tracks of the Kusama relay chain.
pub const KUSAMA_FELLOWSHIP_TRACKS: &[Track] = &[
    track(0, "FellowshipInitiates", 0),
    track(1, "Fellowship1Dan", 1),
    track(2, "Fellowship2Dan", 2),
    track(3, "Fellows", 3),
    track(4, "Fellowship4Dan", 4),
    track(5, "FellowshipExperts", 5),
    track(6, "Fellowship6Dan", 6),
    track(7, "FellowshipMasters", 7),
    track(8, "Fellowship8Dan", 8),
    track(9, "Fellowship9Dan", 9),
];

pub fn tracks_for(domain: Domain, network: Network) -> &'static [Track] {
    match (domain, network) {
        (Domain::Main, _) => GOVERNANCE_TRACKS,
        (Domain::Fellowship, Network::Kusama) => KUSAMA_FELLOWSHIP_TRACKS,
        (Domain::Fellowship, _) => POLKADOT_FELLOWSHIP_TRACKS,
    }
}

pub fn find_track(domain: Domain, network: Network, id: u16) -> Option<&'static Track> {
    tracks_for(domain, network).iter().find(|t| t.id == id)
}

/// Display name of a track, `track #<id>` when it is not catalogued.
pub fn track_name(domain: Domain, network: Network, id: u16) -> String {
    match find_track(domain, network, id) {
        Some(track) if domain == Domain::Fellowship => {
            format!("{} (rank {}+)", track.name, track.min_rank)
        }
        Some(track) => track.name.to_string(),
        None => format!("track #{}", id),
    }
}
