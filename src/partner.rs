//! Allelic partner detection.
//!
//! Two k-mers are allelic partners when they differ by a single base
//! substitution and both sit in the index. A k-mer with exactly one such
//! partner over the whole one-substitution neighborhood is a SNPmer pair
//! candidate; more than one candidate makes it ambiguous, none makes it a
//! confirmed nonpolymorphic k-mer.

use crate::annot::{Annot, AnnotStore};
use crate::index::{KmerIndex, Probe};
use crate::kmers::{Kmer, KmerCoder};

/// Single-base substitution classes as XOR masks on the 2-bit code.
/// `Transversion` is the transversion that is not to the complementary base.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Subst {
    #[default]
    None = 0,
    Transversion = 1,
    Transition = 2,
    Complement = 3,
}

impl Subst {
    /// Sweep order for the partner search.
    pub const SWEEP: [Subst; 3] = [Subst::Transversion, Subst::Transition, Subst::Complement];

    #[inline]
    pub fn mask(&self) -> Kmer {
        *self as Kmer
    }

    pub fn from_u8(v: u8) -> anyhow::Result<Self> {
        match v {
            0 => Ok(Subst::None),
            1 => Ok(Subst::Transversion),
            2 => Ok(Subst::Transition),
            3 => Ok(Subst::Complement),
            _ => Err(anyhow!("illegal substitution mask {v}")),
        }
    }
}

/// Sweep the full one-substitution neighborhood of `w` (3 masks at each of
/// `length` positions) against the index and record the outcome in `ann`.
/// The first hit sets the SNP fields; any second hit makes the sweep
/// ambiguous and clears them again. `w` must be in table-normalized form.
pub fn resolve_partner(idx: &KmerIndex, w: Kmer, ann: &mut Annot) {
    let coder = idx.coder();
    let k = coder.length();
    ann.partnered = false;
    let mut found = false;
    for i in 1..=k {
        for sub in Subst::SWEEP {
            let perturb = coder.mutate(w, sub.mask(), k - i);
            let norm = coder.canonical(perturb);
            if let Probe::Found(_) = idx.lookup_loc(norm) {
                if !found {
                    found = true;
                    ann.partnered = true;
                    ann.pos = i as u8;
                    ann.xor_mask = sub;
                    ann.flip = perturb != norm;
                } else {
                    ann.unambiguous = false;
                    ann.partnered = false;
                    return;
                }
            }
        }
    }
    ann.unambiguous = true;
}

/// Reconstruct a recorded partner from the SNP fields: the raw perturbed
/// k-mer and its table-normalized form.
pub fn partner_forms(coder: &KmerCoder, w: Kmer, ann: &Annot) -> (Kmer, Kmer) {
    let perturb = coder.mutate(w, ann.xor_mask.mask(), coder.length() - ann.pos as usize);
    (perturb, coder.canonical(perturb))
}

/// Representative slot for a k-mer: its own slot, or its partner's when the
/// partner has the lesser encoding. `strand` is toggled when stepping to the
/// partner crosses a strand flip. Returns `None` when `w_norm` is not in the
/// index or is only ambiguously pairable; a recorded partner that cannot be
/// found is a broken table and fatal.
pub fn rep_slot(
    idx: &KmerIndex,
    store: &AnnotStore,
    w_norm: Kmer,
    strand: &mut bool,
) -> anyhow::Result<Option<usize>> {
    let wi = match idx.lookup_loc(w_norm) {
        Probe::Found(s) => s,
        _ => return Ok(None),
    };
    let ann = &store[wi];
    if !ann.partnered {
        return Ok(ann.unambiguous.then_some(wi));
    }
    let (perturb, partner) = partner_forms(idx.coder(), w_norm, ann);
    let pi = match idx.lookup_loc(partner) {
        Probe::Found(s) => s,
        _ => {
            return Err(anyhow!(
                "failed to find recorded partner {partner:x} of {w_norm:x}"
            ))
        }
    };
    Ok(Some(if partner < w_norm {
        if partner != perturb {
            *strand = !*strand;
        }
        pi
    } else {
        wi
    }))
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[allow(dead_code)]
    fn index_with(bases: &[&str]) -> (KmerIndex, Vec<usize>) {
        let mut idx = KmerIndex::new(1009, 1, 0, 4, 0, 0).unwrap();
        let mut slots = Vec::new();
        for s in bases {
            let w = idx.coder().from_bases(s).unwrap();
            match idx.insert(w, 1, 0, 0).unwrap() {
                Probe::Missing(s) | Probe::Found(s) => slots.push(s),
                p => panic!("unexpected {p:?}"),
            }
        }
        (idx, slots)
    }

    #[test]
    fn single_partner_without_flip() {
        let (idx, _) = index_with(&["AAAA", "AAAT"]);
        let w = idx.coder().from_bases("AAAA").unwrap();
        let mut ann = Annot::default();
        resolve_partner(&idx, w, &mut ann);
        assert!(ann.partnered && ann.unambiguous);
        assert_eq!(ann.pos, 4);
        assert_eq!(ann.xor_mask, Subst::Complement);
        assert!(!ann.flip);
        let (perturb, partner) = partner_forms(idx.coder(), w, &ann);
        assert_eq!(perturb, partner);
        assert_eq!(idx.coder().to_bases(partner), "AAAT");
    }

    #[test]
    fn single_partner_with_flip() {
        // GTTA sits in the table; AAAC reaches it only through the
        // reverse complement of its first-base mutation TAAC
        let (idx, _) = index_with(&["AAAC", "GTTA"]);
        let c = *idx.coder();
        let w = c.from_bases("AAAC").unwrap();
        let mut ann = Annot::default();
        resolve_partner(&idx, w, &mut ann);
        assert!(ann.partnered && ann.unambiguous);
        assert_eq!(ann.pos, 1);
        assert_eq!(ann.xor_mask, Subst::Complement);
        assert!(ann.flip);
        let (perturb, partner) = partner_forms(&c, w, &ann);
        assert_eq!(c.to_bases(perturb), "TAAC");
        assert_eq!(c.to_bases(partner), "GTTA");

        // and the pairing is mutual, seen from the other side
        let w2 = c.from_bases("GTTA").unwrap();
        let mut ann2 = Annot::default();
        resolve_partner(&idx, w2, &mut ann2);
        assert!(ann2.partnered && ann2.unambiguous);
        assert_eq!(ann2.pos as usize, c.length() + 1 - ann.pos as usize);
        assert!(ann2.flip);
    }

    #[test]
    fn second_hit_is_ambiguous() {
        // AATT reaches AATA both directly (last base) and through the
        // reverse complement of TATT (first base)
        let (idx, _) = index_with(&["AATT", "AATA"]);
        let w = idx.coder().from_bases("AATT").unwrap();
        let mut ann = Annot::default();
        ann.unambiguous = true;
        resolve_partner(&idx, w, &mut ann);
        assert!(!ann.partnered);
        assert!(!ann.unambiguous);
    }

    #[test]
    fn three_way_neighborhood_is_ambiguous_for_all() {
        // AAAA, AAAC and AAAG differ pairwise in the last base only, so
        // each one sees the other two during its sweep
        let (idx, _) = index_with(&["AAAA", "AAAC", "AAAG"]);
        for s in ["AAAA", "AAAC", "AAAG"] {
            let w = idx.coder().from_bases(s).unwrap();
            let mut ann = Annot::default();
            ann.unambiguous = true;
            resolve_partner(&idx, w, &mut ann);
            assert!(!ann.partnered, "{s} should not pair");
            assert!(!ann.unambiguous, "{s} should be ambiguous");
        }
    }

    #[test]
    fn lonely_kmer_is_unambiguously_unpartnered() {
        let (idx, _) = index_with(&["ACGA"]);
        let w = idx.coder().from_bases("ACGA").unwrap();
        let mut ann = Annot::default();
        resolve_partner(&idx, w, &mut ann);
        assert!(!ann.partnered);
        assert!(ann.unambiguous);
    }

    #[test]
    fn representative_slot_prefers_lesser_partner() {
        let (idx, slots) = index_with(&["AAAC", "GTTA"]);
        let c = *idx.coder();
        let mut store = AnnotStore::new(idx.size());
        for (s, w) in [(slots[0], "AAAC"), (slots[1], "GTTA")] {
            let w = c.from_bases(w).unwrap();
            let mut ann = Annot::default();
            resolve_partner(&idx, w, &mut ann);
            store[s] = ann;
        }
        // AAAC is the lesser encoding: it represents itself
        let mut strand = false;
        let w = c.from_bases("AAAC").unwrap();
        assert_eq!(rep_slot(&idx, &store, w, &mut strand).unwrap(), Some(slots[0]));
        assert!(!strand);
        // GTTA maps to AAAC's slot across a strand flip
        let w = c.from_bases("GTTA").unwrap();
        assert_eq!(rep_slot(&idx, &store, w, &mut strand).unwrap(), Some(slots[0]));
        assert!(strand);
        // absent k-mer
        let w = c.from_bases("CCCC").unwrap();
        assert_eq!(rep_slot(&idx, &store, w, &mut strand).unwrap(), None);
    }
}
