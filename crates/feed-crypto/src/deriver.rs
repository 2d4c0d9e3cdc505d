use sha2::{Digest, Sha256};
use tracing::trace;

use feed_types::{AccountLocator, Address, ProgramId};

use crate::error::{CryptoError, CryptoResult};

/// Longest single seed the ledger accepts.
pub const MAX_SEED_LEN: usize = 32;
/// Most seeds (including the bump) the ledger accepts.
pub const MAX_SEEDS: usize = 16;
/// One attempt per possible bump byte.
pub const MAX_BUMP_ATTEMPTS: usize = 256;

const DERIVED_ADDRESS_MARKER: &[u8] = b"ProgramDerivedAddress";

/// The outcome of a derivation: where the account lives and which bump
/// got it there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DerivedAddress {
    pub locator: AccountLocator,
    pub address: Address,
    pub bump: u8,
}

/// Maps (namespace, indices) to ledger addresses under one program identity.
///
/// Pure and stateless apart from the program identity: the same locator
/// always yields the same address and bump, in any process, at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressDeriver {
    program_id: ProgramId,
}

impl AddressDeriver {
    pub const fn new(program_id: ProgramId) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &ProgramId {
        &self.program_id
    }

    /// Derive the canonical address for a locator.
    pub fn derive(&self, locator: &AccountLocator) -> CryptoResult<DerivedAddress> {
        let seeds = locator.seeds();
        let seed_refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
        let (address, bump) =
            search_bumps(&seed_refs, &self.program_id, is_off_curve).map_err(|e| match e {
                CryptoError::DerivationExhausted { attempts, .. } => {
                    CryptoError::DerivationExhausted {
                        locator: locator.to_string(),
                        attempts,
                    }
                }
                other => other,
            })?;
        trace!(%locator, address = %address.short_hex(), bump, "derived address");
        Ok(DerivedAddress {
            locator: *locator,
            address,
            bump,
        })
    }

    pub fn state(&self) -> CryptoResult<DerivedAddress> {
        self.derive(&AccountLocator::State)
    }

    pub fn post(&self, index: u64) -> CryptoResult<DerivedAddress> {
        self.derive(&AccountLocator::post(index))
    }

    pub fn comment(&self, post_index: u64, comment_index: u64) -> CryptoResult<DerivedAddress> {
        self.derive(&AccountLocator::comment(post_index, comment_index))
    }

    /// Compute the candidate for an explicit bump. Returns `Ok(None)` when
    /// the candidate is on the curve and therefore not a usable address.
    pub fn create_address(
        seeds: &[&[u8]],
        bump: u8,
        program_id: &ProgramId,
    ) -> CryptoResult<Option<Address>> {
        check_seeds(seeds)?;
        let bytes = candidate(seeds, bump, program_id);
        Ok(is_off_curve(&bytes).then(|| Address::from_bytes(bytes)))
    }

    /// Search bumps 255 down to 0 and return the first valid address.
    pub fn find_address(seeds: &[&[u8]], program_id: &ProgramId) -> CryptoResult<(Address, u8)> {
        search_bumps(seeds, program_id, is_off_curve)
    }
}

/// `true` when the bytes do not decompress to an Ed25519 point, i.e. no
/// private key can ever sign for this address.
pub fn is_off_curve(bytes: &[u8; 32]) -> bool {
    ed25519_dalek::VerifyingKey::from_bytes(bytes).is_err()
}

fn check_seeds(seeds: &[&[u8]]) -> CryptoResult<()> {
    // The bump occupies one seed slot.
    if seeds.len() >= MAX_SEEDS {
        return Err(CryptoError::TooManySeeds {
            count: seeds.len() + 1,
            max: MAX_SEEDS,
        });
    }
    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(CryptoError::SeedTooLong {
                index,
                len: seed.len(),
                max: MAX_SEED_LEN,
            });
        }
    }
    Ok(())
}

fn candidate(seeds: &[&[u8]], bump: u8, program_id: &ProgramId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program_id.as_bytes());
    hasher.update(DERIVED_ADDRESS_MARKER);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn search_bumps(
    seeds: &[&[u8]],
    program_id: &ProgramId,
    is_valid: impl Fn(&[u8; 32]) -> bool,
) -> CryptoResult<(Address, u8)> {
    check_seeds(seeds)?;
    for bump in (0..=u8::MAX).rev() {
        let bytes = candidate(seeds, bump, program_id);
        if is_valid(&bytes) {
            return Ok((Address::from_bytes(bytes), bump));
        }
    }
    Err(CryptoError::DerivationExhausted {
        locator: seeds
            .first()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .unwrap_or_default(),
        attempts: MAX_BUMP_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn program() -> ProgramId {
        ProgramId::from_bytes([42; 32])
    }

    #[test]
    fn derive_is_deterministic() {
        let deriver = AddressDeriver::new(program());
        let a = deriver.post(3).unwrap();
        let b = deriver.post(3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derived_addresses_are_off_curve() {
        let deriver = AddressDeriver::new(program());
        for i in 0..32 {
            let derived = deriver.post(i).unwrap();
            assert!(is_off_curve(derived.address.as_bytes()));
        }
    }

    #[test]
    fn bump_is_the_first_valid_from_the_top() {
        let deriver = AddressDeriver::new(program());
        let derived = deriver.post(9).unwrap();
        let seeds = AccountLocator::post(9).seeds();
        let refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
        for higher in (derived.bump as u16 + 1)..=255 {
            let skipped = AddressDeriver::create_address(&refs, higher as u8, &program()).unwrap();
            assert!(skipped.is_none(), "bump {higher} was valid but skipped");
        }
        let chosen = AddressDeriver::create_address(&refs, derived.bump, &program()).unwrap();
        assert_eq!(chosen, Some(derived.address));
    }

    #[test]
    fn namespaces_do_not_collide() {
        let deriver = AddressDeriver::new(program());
        let mut seen = HashSet::new();
        assert!(seen.insert(deriver.state().unwrap().address));
        for i in 0..16 {
            assert!(seen.insert(deriver.post(i).unwrap().address));
            for j in 0..4 {
                assert!(seen.insert(deriver.comment(i, j).unwrap().address));
            }
        }
    }

    #[test]
    fn program_identity_scopes_addresses() {
        let a = AddressDeriver::new(program()).post(0).unwrap();
        let b = AddressDeriver::new(ProgramId::from_bytes([43; 32]))
            .post(0)
            .unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn comment_indices_are_ordered() {
        let deriver = AddressDeriver::new(program());
        assert_ne!(
            deriver.comment(1, 2).unwrap().address,
            deriver.comment(2, 1).unwrap().address
        );
    }

    #[test]
    fn exhausted_search_is_reported() {
        let err = search_bumps(&[b"post"], &program(), |_| false).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::DerivationExhausted { attempts: MAX_BUMP_ATTEMPTS, .. }
        ));
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let long = [0u8; 33];
        let err = AddressDeriver::find_address(&[&long], &program()).unwrap_err();
        assert!(matches!(err, CryptoError::SeedTooLong { index: 0, len: 33, .. }));
    }

    #[test]
    fn too_many_seeds_is_rejected() {
        let seeds: Vec<&[u8]> = (0..MAX_SEEDS).map(|_| b"x".as_slice()).collect();
        assert!(matches!(
            AddressDeriver::find_address(&seeds, &program()),
            Err(CryptoError::TooManySeeds { .. })
        ));
    }

    #[test]
    fn real_public_keys_are_on_curve() {
        let mut csprng = rand::thread_rng();
        let key = ed25519_dalek::SigningKey::generate(&mut csprng);
        assert!(!is_off_curve(key.verifying_key().as_bytes()));
    }

    proptest! {
        #[test]
        fn derive_twice_matches(index in any::<u64>(), seed in any::<[u8; 32]>()) {
            let deriver = AddressDeriver::new(ProgramId::from_bytes(seed));
            prop_assert_eq!(deriver.post(index).unwrap(), deriver.post(index).unwrap());
        }

        #[test]
        fn distinct_indices_give_distinct_addresses(a in any::<u64>(), b in any::<u64>()) {
            prop_assume!(a != b);
            let deriver = AddressDeriver::new(program());
            prop_assert_ne!(deriver.post(a).unwrap().address, deriver.post(b).unwrap().address);
        }
    }
}
