//! Data and Interest packets
//!
//! Only the parts the key chain signs are modelled: a Data packet's name,
//! content and signature, and an Interest's name (signed requests carry
//! their signature inside the name).

use super::signature::{Signature, SignatureInfo};
use crate::core_name::tlv::{self, types, TlvError, TlvReader};
use crate::core_name::Name;

/// A Data packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    name: Name,
    content: Vec<u8>,
    signature: Option<Signature>,
}

impl Data {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            content: Vec::new(),
            signature: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn set_signature(&mut self, signature: Signature) {
        self.signature = Some(signature);
    }

    /// Replace only the signature value, keeping the info
    pub fn set_signature_value(&mut self, value: Vec<u8>) {
        if let Some(signature) = self.signature.as_mut() {
            signature.set_value(value);
        }
    }

    /// Bytes covered by the signature: Name, Content and SignatureInfo
    pub fn signed_portion(&self) -> Vec<u8> {
        let mut out = self.name.wire_encode();
        tlv::write_tlv(&mut out, types::CONTENT, &self.content);
        if let Some(signature) = &self.signature {
            out.extend(signature.info.wire_encode());
        }
        out
    }

    /// Full Data TLV, including the SignatureValue when signed
    pub fn wire_encode(&self) -> Vec<u8> {
        let mut value = self.signed_portion();
        if let Some(signature) = &self.signature {
            value.extend(signature.encode_value());
        }
        tlv::encode_tlv(types::DATA, &value)
    }

    /// Decode a Data TLV produced by `wire_encode`
    pub fn wire_decode(wire: &[u8]) -> Result<Self, TlvError> {
        let value = TlvReader::new(wire).expect(types::DATA)?;
        let mut reader = TlvReader::new(value);

        let name = Name::decode_components(reader.expect(types::NAME)?)?;
        let content = reader.expect(types::CONTENT)?.to_vec();

        let signature = if reader.remaining().is_empty() {
            None
        } else {
            let info_start = reader.remaining();
            let info_value = reader.expect(types::SIGNATURE_INFO)?;
            let info_len = info_start.len() - reader.remaining().len();
            debug_assert!(info_len >= info_value.len());
            let info = SignatureInfo::wire_decode(&info_start[..info_len])?;
            let sig_value = reader.expect(types::SIGNATURE_VALUE)?.to_vec();
            Some(Signature {
                info,
                value: sig_value,
            })
        };

        Ok(Self {
            name,
            content,
            signature,
        })
    }
}

/// An Interest; the signed-request suffix lives in its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    name: Name,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn set_name(&mut self, name: Name) {
        self.name = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_signing::SignatureType;

    #[test]
    fn test_unsigned_data_encoding() {
        let data = Data::new(Name::from_uri("/a").unwrap()).with_content(b"hi".to_vec());
        let wire = data.wire_encode();
        assert_eq!(
            wire,
            vec![0x06, 0x09, 0x07, 0x03, 0x08, 0x01, b'a', 0x15, 0x02, b'h', b'i']
        );
        assert_eq!(Data::wire_decode(&wire).unwrap(), data);
    }

    #[test]
    fn test_signed_data_roundtrip_keeps_signature() {
        let mut data = Data::new(Name::from_uri("/a/b").unwrap()).with_content(b"x".to_vec());
        let mut signature = Signature::unsigned(
            SignatureType::Sha256WithEcdsa,
            Some(Name::from_uri("/k/KEY/ksk-1").unwrap()),
        );
        signature.set_value(vec![9; 8]);
        data.set_signature(signature.clone());

        let decoded = Data::wire_decode(&data.wire_encode()).unwrap();
        assert_eq!(decoded.signature(), Some(&signature));
        assert_eq!(decoded.signed_portion(), data.signed_portion());
    }

    #[test]
    fn test_signed_portion_excludes_value() {
        let mut data = Data::new(Name::from_uri("/a").unwrap());
        data.set_signature(Signature::unsigned(SignatureType::DigestSha256, None));
        let before = data.signed_portion();
        data.set_signature_value(vec![1, 2, 3]);
        assert_eq!(data.signed_portion(), before);
    }
}
