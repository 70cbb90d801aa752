use serde::{Deserialize, Serialize};

use orderdesk_core::{Address, DomainError, DomainResult, Entity, MemberId};

/// Entity: Member.
///
/// Names are meant to be unique, but that is checked by the join flow, not by
/// this type (see `MemberService::join`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    name: String,
    address: Option<Address>,
}

impl Member {
    pub fn new(name: impl Into<String>, address: Option<Address>) -> DomainResult<Self> {
        let name = validate_name(name.into())?;
        Ok(Self {
            id: MemberId::new(),
            name,
            address,
        })
    }

    /// Rebuild a member from persisted columns.
    pub fn restore(id: MemberId, name: String, address: Option<Address>) -> Self {
        Self { id, name, address }
    }

    pub fn id_typed(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn rename(&mut self, name: impl Into<String>) -> DomainResult<()> {
        self.name = validate_name(name.into())?;
        Ok(())
    }

    pub fn relocate(&mut self, address: Address) {
        self.address = Some(address);
    }
}

fn validate_name(name: String) -> DomainResult<String> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("member name cannot be empty"));
    }
    Ok(name)
}

impl Entity for Member {
    type Id = MemberId;
    const NAME: &'static str = "member";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
