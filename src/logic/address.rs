use crate::model::Network;

/// Check that `address` is a Base58Check P2PKH/P2SH address of `network`
pub fn validate_address(address: &str, network: Network) -> bool {
    let params = network.params();
    let payload = match bs58::decode(address.trim()).with_check(None).into_vec() {
        Ok(payload) => payload,
        Err(_) => return false,
    };
    if payload.len() != 21 {
        return false;
    }
    payload
        .first()
        .is_some_and(|version| *version == params.p2pkh_version || *version == params.p2sh_version)
}
