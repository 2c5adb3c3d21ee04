//! Discordant-pair SV calling: filtering, clustering, post-pass, classification.

pub mod classify;
pub mod cluster;
pub mod filter;
pub mod fragsize;
pub mod postpass;

/// The SV classes a discordant pair can vote for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub enum SvType {
    /// Insertion
    Ins,
    /// Deletion
    Del,
    /// Inversion
    Inv,
    /// Intra-chromosomal translocation
    Itx,
    /// Inter-chromosomal translocation
    Ctx,
    /// Unclassifiable
    Unk,
}

impl SvType {
    /// All types, in tally (and tie-break) order.
    pub const ALL: [SvType; 6] = [
        SvType::Ins,
        SvType::Del,
        SvType::Inv,
        SvType::Itx,
        SvType::Ctx,
        SvType::Unk,
    ];

    pub fn index(self) -> usize {
        match self {
            SvType::Ins => 0,
            SvType::Del => 1,
            SvType::Inv => 2,
            SvType::Itx => 3,
            SvType::Ctx => 4,
            SvType::Unk => 5,
        }
    }
}

impl std::fmt::Display for SvType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SvType::Ins => "INS",
            SvType::Del => "DEL",
            SvType::Inv => "INV",
            SvType::Itx => "ITX",
            SvType::Ctx => "CTX",
            SvType::Unk => "UNK",
        };
        write!(f, "{}", label)
    }
}
