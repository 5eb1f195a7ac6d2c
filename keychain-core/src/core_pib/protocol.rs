//! Out-of-process PIB command contract
//!
//! A PIB service is addressed with signed commands of the form
//! ```text
//! /localhost/pib/<user>/<verb>/<param>/<timestamp>/<nonce>/<SignatureInfo>/<SignatureValue>
//! ```
//! The last four components are the signed-request suffix. This module
//! only defines the layout and codes; no server lives here.

use crate::core_name::tlv::{self, TlvReader};
use crate::core_name::{Component, Name};
use crate::core_signing::SignedRequest;
use std::fmt;

pub const OFFSET_USER: usize = 2;
pub const OFFSET_VERB: usize = 3;
pub const OFFSET_PARAM: usize = 4;
pub const OFFSET_TIMESTAMP: usize = 5;
pub const OFFSET_NONCE: usize = 6;
pub const OFFSET_SIG_INFO: usize = 7;
pub const OFFSET_SIG_VALUE: usize = 8;

/// Components in a signed command
pub const SIGNED_PIB_INTEREST_SIZE: usize = 9;

/// Components in a command before signing
pub const UNSIGNED_PIB_INTEREST_SIZE: usize = OFFSET_PARAM + 1;

/// TLV types used in command parameters and responses
pub mod types {
    pub const GET_PARAM: u64 = 128;
    pub const DEFAULT_PARAM: u64 = 129;
    pub const LIST_PARAM: u64 = 130;
    pub const UPDATE_PARAM: u64 = 131;
    pub const DELETE_PARAM: u64 = 132;

    pub const TYPE: u64 = 144;
    pub const IDENTITY: u64 = 145;
    pub const PUBLIC_KEY: u64 = 146;
    pub const CERTIFICATE: u64 = 147;
    pub const BYTES: u64 = 148;
    pub const DEFAULT_OPT: u64 = 149;
    pub const NAME_LIST: u64 = 150;
    pub const USER: u64 = 151;
    pub const ERROR: u64 = 152;

    pub const ERROR_CODE: u64 = 252;
}

fn command_prefix() -> Name {
    Name::new().append("localhost").append("pib")
}

/// Command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PibVerb {
    Get,
    Default,
    List,
    Update,
    Delete,
}

impl PibVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            PibVerb::Get => "get",
            PibVerb::Default => "default",
            PibVerb::List => "list",
            PibVerb::Update => "update",
            PibVerb::Delete => "delete",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"get" => Some(PibVerb::Get),
            b"default" => Some(PibVerb::Default),
            b"list" => Some(PibVerb::List),
            b"update" => Some(PibVerb::Update),
            b"delete" => Some(PibVerb::Delete),
            _ => None,
        }
    }

    /// TLV type of this verb's parameter block
    pub fn param_type(&self) -> u64 {
        match self {
            PibVerb::Get => types::GET_PARAM,
            PibVerb::Default => types::DEFAULT_PARAM,
            PibVerb::List => types::LIST_PARAM,
            PibVerb::Update => types::UPDATE_PARAM,
            PibVerb::Delete => types::DELETE_PARAM,
        }
    }
}

impl fmt::Display for PibVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity a command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PibEntityType {
    User,
    Identity,
    Key,
    Certificate,
    Default,
}

impl PibEntityType {
    pub fn code(&self) -> u64 {
        match self {
            PibEntityType::User => 0,
            PibEntityType::Identity => 1,
            PibEntityType::Key => 2,
            PibEntityType::Certificate => 3,
            PibEntityType::Default => 255,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(PibEntityType::User),
            1 => Some(PibEntityType::Identity),
            2 => Some(PibEntityType::Key),
            3 => Some(PibEntityType::Certificate),
            255 => Some(PibEntityType::Default),
            _ => None,
        }
    }
}

/// How far up an update propagates the default pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOpt {
    No,
    Key,
    Identity,
    User,
}

impl DefaultOpt {
    const KEY_MASK: u64 = 0x1;
    const ID_MASK: u64 = 0x2;
    const USER_MASK: u64 = 0x4;

    pub fn code(&self) -> u64 {
        match self {
            DefaultOpt::No => 0,
            DefaultOpt::Key => 1,
            DefaultOpt::Identity => 3,
            DefaultOpt::User => 7,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(DefaultOpt::No),
            1 => Some(DefaultOpt::Key),
            3 => Some(DefaultOpt::Identity),
            7 => Some(DefaultOpt::User),
            _ => None,
        }
    }

    /// Whether the entity becomes its key's default
    pub fn sets_key_default(&self) -> bool {
        self.code() & Self::KEY_MASK != 0
    }

    pub fn sets_identity_default(&self) -> bool {
        self.code() & Self::ID_MASK != 0
    }

    pub fn sets_user_default(&self) -> bool {
        self.code() & Self::USER_MASK != 0
    }
}

/// Result codes carried in PIB responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PibErrorCode {
    Success,
    IncompleteCommand,
    WrongVerb,
    WrongParam,
    WrongSigner,
    InternalError,
    NonExistingUser,
    NonExistingIdentity,
    NonExistingKey,
    NonExistingCertificate,
    NoDefaultIdentity,
    NoDefaultKey,
    NoDefaultCertificate,
    DeleteDefaultSetting,
}

impl PibErrorCode {
    pub fn code(&self) -> u64 {
        match self {
            PibErrorCode::Success => 0,
            PibErrorCode::IncompleteCommand => 1,
            PibErrorCode::WrongVerb => 2,
            PibErrorCode::WrongParam => 3,
            PibErrorCode::WrongSigner => 4,
            PibErrorCode::InternalError => 5,
            PibErrorCode::NonExistingUser => 128,
            PibErrorCode::NonExistingIdentity => 129,
            PibErrorCode::NonExistingKey => 130,
            PibErrorCode::NonExistingCertificate => 131,
            PibErrorCode::NoDefaultIdentity => 256,
            PibErrorCode::NoDefaultKey => 257,
            PibErrorCode::NoDefaultCertificate => 258,
            PibErrorCode::DeleteDefaultSetting => 384,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        let all = [
            PibErrorCode::Success,
            PibErrorCode::IncompleteCommand,
            PibErrorCode::WrongVerb,
            PibErrorCode::WrongParam,
            PibErrorCode::WrongSigner,
            PibErrorCode::InternalError,
            PibErrorCode::NonExistingUser,
            PibErrorCode::NonExistingIdentity,
            PibErrorCode::NonExistingKey,
            PibErrorCode::NonExistingCertificate,
            PibErrorCode::NoDefaultIdentity,
            PibErrorCode::NoDefaultKey,
            PibErrorCode::NoDefaultCertificate,
            PibErrorCode::DeleteDefaultSetting,
        ];
        all.into_iter().find(|c| c.code() == code)
    }

    pub fn is_success(&self) -> bool {
        *self == PibErrorCode::Success
    }

    /// `Error { ErrorCode }` response block
    pub fn wire_encode(&self) -> Vec<u8> {
        let mut code = Vec::new();
        tlv::write_tlv(
            &mut code,
            types::ERROR_CODE,
            &tlv::encode_nonneg_integer(self.code()),
        );
        tlv::encode_tlv(types::ERROR, &code)
    }

    pub fn wire_decode(wire: &[u8]) -> Option<Self> {
        let value = TlvReader::new(wire).expect(types::ERROR).ok()?;
        let code = TlvReader::new(value).expect(types::ERROR_CODE).ok()?;
        Self::from_code(tlv::decode_nonneg_integer(code).ok()?)
    }
}

impl fmt::Display for PibErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PibErrorCode::Success => "success",
            PibErrorCode::IncompleteCommand => "malformed command",
            PibErrorCode::WrongVerb => "wrong verb",
            PibErrorCode::WrongParam => "wrong parameter",
            PibErrorCode::WrongSigner => "wrong signer",
            PibErrorCode::InternalError => "internal error",
            PibErrorCode::NonExistingUser => "non-existing user",
            PibErrorCode::NonExistingIdentity => "non-existing identity",
            PibErrorCode::NonExistingKey => "non-existing key",
            PibErrorCode::NonExistingCertificate => "non-existing certificate",
            PibErrorCode::NoDefaultIdentity => "no default identity",
            PibErrorCode::NoDefaultKey => "no default key",
            PibErrorCode::NoDefaultCertificate => "no default certificate",
            PibErrorCode::DeleteDefaultSetting => "cannot delete default setting",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

/// A PIB command: who asks, what for, and about which entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PibCommand {
    pub user: String,
    pub verb: PibVerb,
    pub entity_type: PibEntityType,
    pub target: Option<Name>,
}

impl PibCommand {
    pub fn new(
        user: impl Into<String>,
        verb: PibVerb,
        entity_type: PibEntityType,
        target: Option<Name>,
    ) -> Self {
        Self {
            user: user.into(),
            verb,
            entity_type,
            target,
        }
    }

    /// Parameter block: `<VerbParam> { Type [Name] }`
    pub fn encode_param(&self) -> Vec<u8> {
        let mut value = Vec::new();
        tlv::write_tlv(
            &mut value,
            types::TYPE,
            &tlv::encode_nonneg_integer(self.entity_type.code()),
        );
        if let Some(target) = &self.target {
            value.extend(target.wire_encode());
        }
        tlv::encode_tlv(self.verb.param_type(), &value)
    }

    /// Unsigned command name, ready for the signed-request suffix
    pub fn to_name(&self) -> Name {
        command_prefix()
            .append(self.user.as_str())
            .append(self.verb.as_str())
            .append(Component::from_bytes(self.encode_param()))
    }

    /// Validate a signed command name and split it into the command and
    /// its signed-request parts
    pub fn parse(name: &Name) -> Result<(Self, SignedRequest), PibErrorCode> {
        if name.len() != SIGNED_PIB_INTEREST_SIZE || !command_prefix().is_prefix_of(name) {
            return Err(PibErrorCode::IncompleteCommand);
        }
        let component = |offset: usize| {
            name.get(offset as isize)
                .ok_or(PibErrorCode::IncompleteCommand)
        };

        let user = String::from_utf8(component(OFFSET_USER)?.as_bytes().to_vec())
            .map_err(|_| PibErrorCode::IncompleteCommand)?;
        let verb = PibVerb::from_bytes(component(OFFSET_VERB)?.as_bytes())
            .ok_or(PibErrorCode::WrongVerb)?;

        let param = TlvReader::new(component(OFFSET_PARAM)?.as_bytes())
            .expect(verb.param_type())
            .map_err(|_| PibErrorCode::WrongParam)?;
        let mut reader = TlvReader::new(param);
        let type_code = reader
            .expect(types::TYPE)
            .ok()
            .and_then(|bytes| tlv::decode_nonneg_integer(bytes).ok())
            .ok_or(PibErrorCode::WrongParam)?;
        let entity_type = PibEntityType::from_code(type_code).ok_or(PibErrorCode::WrongParam)?;
        let target = if reader.remaining().is_empty() {
            None
        } else {
            Some(Name::wire_decode(reader.remaining()).map_err(|_| PibErrorCode::WrongParam)?)
        };

        let request = SignedRequest::parse(name).ok_or(PibErrorCode::IncompleteCommand)?;

        Ok((
            Self {
                user,
                verb,
                entity_type,
                target,
            },
            request,
        ))
    }
}
