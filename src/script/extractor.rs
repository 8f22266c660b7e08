//! Address recovery from locking and signature scripts.
//!
//! Output side recognizes plain P2PKH. Input side tries, in order,
//! P2SH-redeem, P2PKH, and P2WPKH-SH — the three shapes this engine
//! indexes addresses for; anything else yields no address, which the
//! store records as an empty string rather than an error.

use crate::config::Network;
use crate::crypto::{base58check_encode, hash160};

use super::{opcodes, parse_script, ScriptItem};

/// The recognized destination shape a script resolved to, used by
/// callers that need to distinguish P2SH-wrapped payloads from plain
/// P2PKH/P2WPKH-SH ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    P2pkh,
    P2sh,
    P2wpkhSh,
}

/// Recover the payee address from an output locking script, if it
/// matches plain P2PKH (`OP_DUP OP_HASH160 <20B> OP_EQUALVERIFY
/// OP_CHECKSIG`). Any other shape yields `None`.
pub fn extract_output_address(network: &Network, script_pubkey: &[u8]) -> Option<String> {
    if script_pubkey.len() != 25 {
        return None;
    }
    let items = parse_script(script_pubkey)?;
    match items.as_slice() {
        [
            ScriptItem::Op(opcodes::OP_DUP),
            ScriptItem::Op(opcodes::OP_HASH160),
            ScriptItem::Push(hash),
            ScriptItem::Op(opcodes::OP_EQUALVERIFY),
            ScriptItem::Op(opcodes::OP_CHECKSIG),
        ] if hash.len() == 20 => Some(base58check_encode(network.p2pkh_version, hash)),
        _ => None,
    }
}

const PAY_FROM_SCRIPTHASH_OPCODES: &[u8] = &[
    opcodes::OP_CHECKSIG,
    opcodes::OP_CHECKSIGVERIFY,
    opcodes::OP_CHECKMULTISIG,
    opcodes::OP_CHECKMULTISIGVERIFY,
    opcodes::OP_EQUAL,
];

fn redeem_script_final_opcode(redeem_script: &[u8]) -> Option<u8> {
    let items = parse_script(redeem_script)?;
    let last = items.last()?;
    match last {
        ScriptItem::Op(opcodes::OP_ENDIF) => {
            // final opcode is the one just before a terminal OP_ENDIF
            match items.get(items.len().checked_sub(2)?)? {
                ScriptItem::Op(op) => Some(*op),
                ScriptItem::Push(_) => None,
            }
        }
        ScriptItem::Op(op) => Some(*op),
        ScriptItem::Push(_) => None,
    }
}

/// Try the P2SH-redeem shape: the signature script's last push is a
/// redeem script whose terminal opcode belongs to the known
/// pay-from-scripthash set.
fn try_p2sh_redeem(script_sig: &[u8]) -> Option<(AddressType, Vec<u8>)> {
    let items = parse_script(script_sig)?;
    let redeem_script = match items.last()? {
        ScriptItem::Push(data) => data,
        ScriptItem::Op(_) => return None,
    };
    let final_opcode = redeem_script_final_opcode(redeem_script)?;
    if PAY_FROM_SCRIPTHASH_OPCODES.contains(&final_opcode) {
        Some((AddressType::P2sh, redeem_script.clone()))
    } else {
        None
    }
}

/// Try the plain P2PKH signature-script shape: `<sig> <pubkey>`, with the
/// DER signature push length constrained to 71–74 bytes (the push
/// opcode doubling as the byte count for pushes under 76 bytes) and a
/// 33- or 65-byte pubkey push filling out the rest of the script exactly.
fn try_p2pkh(script_sig: &[u8]) -> Option<(AddressType, Vec<u8>)> {
    if script_sig.len() < 106 {
        return None;
    }
    let sig_push_len = script_sig[0];
    if !(71..=74).contains(&sig_push_len) {
        return None;
    }
    let pubkey_len_offset = 1 + sig_push_len as usize;
    let pubkey_len = *script_sig.get(pubkey_len_offset)? as usize;
    if pubkey_len != 33 && pubkey_len != 65 {
        return None;
    }
    let pubkey_start = pubkey_len_offset + 1;
    let pubkey_end = pubkey_start + pubkey_len;
    if pubkey_end != script_sig.len() {
        return None;
    }
    Some((AddressType::P2pkh, script_sig[pubkey_start..pubkey_end].to_vec()))
}

/// Try the P2WPKH-SH shape: a 23-byte signature script that is itself a
/// single push of a 22-byte witness program (`<version> <20B>`).
fn try_p2wpkh_sh(script_sig: &[u8]) -> Option<(AddressType, Vec<u8>)> {
    if script_sig.len() != 23 || script_sig[0] != 0x16 {
        return None;
    }
    let version = script_sig[1];
    let is_valid_version = version == 0x00 || (0x51..=0x60).contains(&version);
    if !is_valid_version || script_sig[2] != 0x14 {
        return None;
    }
    Some((AddressType::P2wpkhSh, script_sig[1..23].to_vec()))
}

/// Recover the payer address from a transaction input's signature
/// script, trying P2SH-redeem, then P2PKH, then P2WPKH-SH in that order.
pub fn extract_input_address(network: &Network, script_sig: &[u8]) -> Option<String> {
    let (address_type, payload) = try_p2sh_redeem(script_sig)
        .or_else(|| try_p2pkh(script_sig))
        .or_else(|| try_p2wpkh_sh(script_sig))?;

    let version = match address_type {
        AddressType::P2pkh => network.p2pkh_version,
        AddressType::P2sh | AddressType::P2wpkhSh => network.p2sh_version,
    };
    Some(base58check_encode(version, &hash160(&payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BITCOIN_MAINNET;

    fn p2pkh_locking_script(hash: &[u8; 20]) -> Vec<u8> {
        let mut script = vec![opcodes::OP_DUP, opcodes::OP_HASH160, 0x14];
        script.extend_from_slice(hash);
        script.push(opcodes::OP_EQUALVERIFY);
        script.push(opcodes::OP_CHECKSIG);
        script
    }

    #[test]
    fn recovers_p2pkh_output_address() {
        let hash = [0x11u8; 20];
        let script = p2pkh_locking_script(&hash);
        let address = extract_output_address(&BITCOIN_MAINNET, &script).unwrap();
        assert_eq!(address, base58check_encode(BITCOIN_MAINNET.p2pkh_version, &hash));
    }

    #[test]
    fn non_p2pkh_output_yields_none() {
        let script = [opcodes::OP_EQUAL];
        assert!(extract_output_address(&BITCOIN_MAINNET, &script).is_none());
    }

    #[test]
    fn recovers_p2pkh_input_address() {
        let mut script_sig = vec![71u8];
        script_sig.extend(vec![0xAAu8; 71]);
        script_sig.push(33);
        script_sig.extend(vec![0x02u8; 33]);
        assert_eq!(script_sig.len(), 1 + 71 + 1 + 33);

        let address = extract_input_address(&BITCOIN_MAINNET, &script_sig).unwrap();
        let pubkey = &script_sig[1 + 71 + 1..];
        assert_eq!(address, base58check_encode(BITCOIN_MAINNET.p2pkh_version, &hash160(pubkey)));
    }

    #[test]
    fn recovers_p2wpkh_sh_input_address() {
        let mut script_sig = vec![0x16, 0x00, 0x14];
        script_sig.extend(vec![0x03u8; 20]);
        let address = extract_input_address(&BITCOIN_MAINNET, &script_sig).unwrap();
        let payload = &script_sig[1..23];
        assert_eq!(address, base58check_encode(BITCOIN_MAINNET.p2sh_version, &hash160(payload)));
    }

    #[test]
    fn recovers_p2sh_redeem_input_address() {
        // redeem script: <pubkey push> OP_CHECKSIG
        let mut redeem_script = vec![33u8];
        redeem_script.extend(vec![0x02u8; 33]);
        redeem_script.push(opcodes::OP_CHECKSIG);

        let mut script_sig = vec![71u8];
        script_sig.extend(vec![0xAAu8; 71]);
        script_sig.push(redeem_script.len() as u8);
        script_sig.extend_from_slice(&redeem_script);

        let address = extract_input_address(&BITCOIN_MAINNET, &script_sig).unwrap();
        assert_eq!(
            address,
            base58check_encode(BITCOIN_MAINNET.p2sh_version, &hash160(&redeem_script))
        );
    }

    #[test]
    fn unrecognized_input_script_yields_none() {
        let script_sig = [0x01, 0x02];
        assert!(extract_input_address(&BITCOIN_MAINNET, &script_sig).is_none());
    }
}
