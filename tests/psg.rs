// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests over the PSG certificate codec and chain of
//! trust, driven by freshly generated EC keys.

use codicon::Encoder;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use openssl::pkey::Private;
use openssl::sha;
use psg_attest::certs::psg::{
    Actor, CertificateEntry, ChainAssembler, CurveType, LeafEntry, PsgChain, PsgEccKey,
    PsgPublicKey, PsgSignature, RootEntry, RootHashType, PUBKEY_MAGIC,
};
use psg_attest::certs::Verifiable;
use psg_attest::Error;

fn generate(curve: CurveType) -> EcKey<Private> {
    let nid = match curve {
        CurveType::Secp256r1 => Nid::X9_62_PRIME256V1,
        CurveType::Secp384r1 => Nid::SECP384R1,
    };
    let group = EcGroup::from_curve_name(nid).unwrap();
    EcKey::generate(&group).unwrap()
}

fn psg_key(key: &EcKey<Private>, curve: CurveType) -> PsgEccKey {
    let group = key.group();
    let mut ctx = BigNumContext::new().unwrap();
    let mut x = BigNum::new().unwrap();
    let mut y = BigNum::new().unwrap();
    key.public_key()
        .affine_coordinates_gfp(group, &mut x, &mut y, &mut ctx)
        .unwrap();

    PsgEccKey {
        magic: PUBKEY_MAGIC,
        curve,
        permissions: 0xFFFF_FFFF,
        cancellation: 0xFFFF_FFFF,
        x: x.to_vec_padded(curve.size() as i32).unwrap(),
        y: y.to_vec_padded(curve.size() as i32).unwrap(),
    }
}

fn sign_leaf(leaf: &mut LeafEntry, signer: &EcKey<Private>, curve: CurveType) {
    let payload = leaf.signed_payload().unwrap();
    let digest = match curve {
        CurveType::Secp256r1 => sha::sha256(&payload).to_vec(),
        CurveType::Secp384r1 => sha::sha384(&payload).to_vec(),
    };
    let sig = EcdsaSig::sign(&digest, signer).unwrap();
    leaf.signature = Some(PsgSignature::from_der(&sig.to_der().unwrap(), curve).unwrap());
}

/// Builds a two-member chain (root signs leaf) over secp384r1,
/// returning it together with the root key.
fn build_chain() -> (Vec<u8>, EcKey<Private>) {
    let curve = CurveType::Secp384r1;
    let root_key = generate(curve);
    let leaf_key = generate(curve);

    let root = RootEntry::new(
        RootHashType::Intel,
        PsgPublicKey::Ecc(psg_key(&root_key, curve)),
    )
    .unwrap();
    let mut leaf = LeafEntry::new(PsgPublicKey::Ecc(psg_key(&leaf_key, curve)), None);
    sign_leaf(&mut leaf, &root_key, curve);

    let mut blob = Vec::new();
    root.encode(&mut blob, Actor::Firmware).unwrap();
    leaf.encode(&mut blob, Actor::Firmware).unwrap();
    (blob, root_key)
}

#[test]
fn assembled_chain_verifies() {
    let (blob, root_key) = build_chain();

    let entries = ChainAssembler::assemble(&blob).unwrap();
    assert_eq!(entries.len(), 2);

    let chain = PsgChain::try_from(entries).unwrap();
    assert!(chain.verify_chain_of_trust().unwrap());
    let leaf = (&chain).verify().unwrap();
    assert!(leaf.pub_key.is_some());

    let fingerprint = psg_key(&root_key, CurveType::Secp384r1).fingerprint();
    chain.verify_root(&fingerprint).unwrap();
}

#[test]
fn tampered_leaf_key_fails_verification() {
    let (blob, _) = build_chain();
    let entries = ChainAssembler::assemble(&blob).unwrap();
    let mut chain = PsgChain::try_from(entries).unwrap();

    // Flip one bit of the certified key. The signature must no longer
    // verify, without raising an error.
    let mut tampered = chain.entries().to_vec();
    if let CertificateEntry::Leaf(leaf) = &mut tampered[1].entry {
        if let Some(PsgPublicKey::Ecc(key)) = &mut leaf.pub_key {
            key.x[0] ^= 0x01;
        }
    }
    chain = PsgChain::try_from(tampered).unwrap();
    assert!(!chain.verify_chain_of_trust().unwrap());
    assert!(matches!((&chain).verify(), Err(Error::InvalidSignature)));
}

#[test]
fn unsigned_leaf_is_a_clean_failure() {
    let curve = CurveType::Secp384r1;
    let root_key = generate(curve);
    let leaf_key = generate(curve);

    let root = RootEntry::new(
        RootHashType::Intel,
        PsgPublicKey::Ecc(psg_key(&root_key, curve)),
    )
    .unwrap();
    let leaf = LeafEntry::new(PsgPublicKey::Ecc(psg_key(&leaf_key, curve)), None);

    let mut blob = Vec::new();
    root.encode(&mut blob, Actor::Firmware).unwrap();
    leaf.encode(&mut blob, Actor::Firmware).unwrap();

    let chain = PsgChain::try_from(ChainAssembler::assemble(&blob).unwrap()).unwrap();
    assert!(!chain.verify_chain_of_trust().unwrap());
}

#[test]
fn wrong_root_fingerprint_is_rejected() {
    let (blob, _) = build_chain();
    let chain = PsgChain::try_from(ChainAssembler::assemble(&blob).unwrap()).unwrap();
    let err = chain.verify_root(&[0u8; 32]).unwrap_err();
    assert!(matches!(err, Error::ChainValidation { rule, .. } if rule == "trusted root"));
}

#[test]
fn trailing_garbage_ends_assembly_silently() {
    let (mut blob, _) = build_chain();
    // Fewer than 8 bytes cannot carry a magic and length.
    blob.extend_from_slice(&[0xDE, 0xAD, 0xBE]);
    let entries = ChainAssembler::assemble(&blob).unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn lone_leaf_with_short_tail_assembles_to_one_entry() {
    let curve = CurveType::Secp384r1;
    let leaf_key = generate(curve);
    let leaf = LeafEntry::new(PsgPublicKey::Ecc(psg_key(&leaf_key, curve)), None);

    let mut blob = Vec::new();
    leaf.encode(&mut blob, Actor::Firmware).unwrap();
    blob.extend_from_slice(&[0x00, 0xFF]);

    let entries = ChainAssembler::assemble(&blob).unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn unknown_magic_ends_assembly_silently() {
    let (mut blob, _) = build_chain();
    blob.extend_from_slice(&0xAABB_CCDDu32.to_le_bytes());
    blob.extend_from_slice(&16u32.to_le_bytes());
    blob.extend_from_slice(&[0u8; 8]);
    let entries = ChainAssembler::assemble(&blob).unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn truncated_entry_is_an_error() {
    let (blob, _) = build_chain();
    // Cut into the final entry so its declared length overruns the
    // remaining bytes.
    let cut = blob.len() - 10;
    assert!(matches!(
        ChainAssembler::assemble(&blob[..cut]),
        Err(Error::StructureParse(_))
    ));
}

#[test]
fn single_entry_is_not_a_chain() {
    let curve = CurveType::Secp384r1;
    let root_key = generate(curve);
    let root = RootEntry::new(
        RootHashType::Intel,
        PsgPublicKey::Ecc(psg_key(&root_key, curve)),
    )
    .unwrap();

    let mut blob = Vec::new();
    root.encode(&mut blob, Actor::Firmware).unwrap();

    let entries = ChainAssembler::assemble(&blob).unwrap();
    assert!(matches!(
        PsgChain::try_from(entries),
        Err(Error::ChainValidation { rule, .. }) if rule == "chain shape"
    ));
}

#[test]
fn pairwise_verification_matches_chain_walk() {
    let (blob, _) = build_chain();
    let chain = PsgChain::try_from(ChainAssembler::assemble(&blob).unwrap()).unwrap();
    let entries = chain.entries();
    (&entries[0].entry, &entries[1].entry).verify().unwrap();
}

#[test]
fn root_hash_msb_round_trips() {
    let curve = CurveType::Secp384r1;
    let key = generate(curve);
    let root = RootEntry::new(RootHashType::Intel, PsgPublicKey::Ecc(psg_key(&key, curve)))
        .unwrap();
    root.verify_hash_msb().unwrap();

    let mut bytes = Vec::new();
    root.encode(&mut bytes, Actor::Service).unwrap();
    let parsed = CertificateEntry::parse(&bytes, Actor::Service).unwrap();
    match parsed {
        CertificateEntry::Root(parsed) => parsed.verify_hash_msb().unwrap(),
        other => panic!("parsed {other:?} instead of a root entry"),
    }
}

#[test]
fn secp256r1_chain_verifies_with_sha256() {
    let curve = CurveType::Secp256r1;
    let root_key = generate(curve);
    let leaf_key = generate(curve);

    let root = RootEntry::new(
        RootHashType::Intel,
        PsgPublicKey::Ecc(psg_key(&root_key, curve)),
    )
    .unwrap();
    let mut leaf = LeafEntry::new(PsgPublicKey::Ecc(psg_key(&leaf_key, curve)), None);
    sign_leaf(&mut leaf, &root_key, curve);

    let mut blob = Vec::new();
    root.encode(&mut blob, Actor::Firmware).unwrap();
    leaf.encode(&mut blob, Actor::Firmware).unwrap();

    let chain = PsgChain::try_from(ChainAssembler::assemble(&blob).unwrap()).unwrap();
    assert!(chain.verify_chain_of_trust().unwrap());
}
