use aeat_sii_core::storage::{Company, CompanyRepository, InMemoryCompanyRepository};
use aeat_sii_storage::{
    credential_store::CredentialStore,
    key_cipher::KeyCipher,
    key_provider::{generate_key, KeyMaterial},
};
use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkcs12::Pkcs12,
    pkey::{PKey, Private},
    stack::Stack,
    x509::{X509NameBuilder, X509},
};

pub const PASSWORD: &str = "contraseña-segura";

/// Self-signed P-256 certificate and its key.
pub fn self_signed(common_name: &str) -> (PKey<Private>, X509) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("group");
    let pkey = PKey::from_ec_key(EcKey::generate(&group).expect("ec key")).expect("pkey");

    let mut name = X509NameBuilder::new().expect("name builder");
    name.append_entry_by_text("CN", common_name).expect("cn");
    let name = name.build();

    let mut builder = X509::builder().expect("x509 builder");
    builder.set_version(2).expect("version");
    let serial = BigNum::from_u32(1)
        .and_then(|bn| bn.to_asn1_integer())
        .expect("serial");
    builder.set_serial_number(&serial).expect("serial");
    builder.set_subject_name(&name).expect("subject");
    builder.set_issuer_name(&name).expect("issuer");
    builder.set_pubkey(&pkey).expect("pubkey");
    builder
        .set_not_before(&Asn1Time::days_from_now(0).expect("not before"))
        .expect("not before");
    builder
        .set_not_after(&Asn1Time::days_from_now(365).expect("not after"))
        .expect("not after");
    builder.sign(&pkey, MessageDigest::sha256()).expect("sign");
    (pkey, builder.build())
}

/// DER-encoded PKCS12 bundle, optionally with extra CA certificates.
pub fn bundle(pkey: &PKey<Private>, cert: &X509, ca: Vec<X509>, password: &str) -> Vec<u8> {
    let mut builder = Pkcs12::builder();
    builder.name("aeat-sii").pkey(pkey).cert(cert);
    if !ca.is_empty() {
        let mut stack = Stack::new().expect("stack");
        for c in ca {
            stack.push(c).expect("push");
        }
        builder.ca(stack);
    }
    builder
        .build2(password)
        .and_then(|p12| p12.to_der())
        .expect("pkcs12")
}

pub fn store_with_key(
    material: &KeyMaterial,
) -> (InMemoryCompanyRepository, CredentialStore<InMemoryCompanyRepository, KeyCipher>) {
    let repo = InMemoryCompanyRepository::new();
    repo.save(&Company::new(1, "Acme SL")).expect("seed company");
    let store = CredentialStore::new(repo.clone(), KeyCipher::new(material));
    (repo, store)
}

pub fn store() -> (InMemoryCompanyRepository, CredentialStore<InMemoryCompanyRepository, KeyCipher>) {
    store_with_key(&generate_key())
}
