use rand::Rng;
use sha2::{Digest, Sha256};
use ulid::Ulid;

use crate::limits::MAX_CONTACT_FIELD_LEN;
use crate::model::*;

use super::bookings::{clean_note, clean_purpose};
use super::lifecycle::{Authority, Lane, Transition};
use super::{Engine, EngineError};

/// An anonymous booking request with the guest's contact details.
#[derive(Debug, Clone)]
pub struct NewGuestBooking {
    pub resource_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub purpose: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub department: String,
}

/// Returned once, at creation. The token is not recoverable afterwards.
#[derive(Debug, Clone)]
pub struct GuestReceipt {
    pub booking: Booking,
    pub access_token: String,
}

/// 256 random bits, hex encoded.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

pub(crate) fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn contact_field(value: &str, field: &str) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::InvalidInput(format!("{field} is required")));
    }
    if value.len() > MAX_CONTACT_FIELD_LEN {
        return Err(EngineError::LimitExceeded("contact field too long"));
    }
    Ok(value.to_string())
}

fn clean_contact(req: &NewGuestBooking) -> Result<GuestContact, EngineError> {
    let email = contact_field(&req.email, "email")?;
    if !email.contains('@') {
        return Err(EngineError::InvalidInput("email is not valid".into()));
    }
    Ok(GuestContact {
        name: contact_field(&req.name, "name")?,
        email,
        phone: contact_field(&req.phone, "phone")?,
        department: contact_field(&req.department, "department")?,
    })
}

impl Engine {
    pub async fn create_guest_booking(&self, req: NewGuestBooking) -> Result<GuestReceipt, EngineError> {
        let contact = clean_contact(&req)?;
        let purpose = clean_purpose(&req.purpose)?;
        let access_token = generate_token();
        let party = Party::Guest {
            contact,
            token_digest: token_digest(&access_token),
        };
        let booking = self
            .request_booking(req.resource_id, req.start, req.end, purpose, party)
            .await?;
        Ok(GuestReceipt { booking, access_token })
    }

    fn guest_booking_id(&self, token: &str) -> Result<Ulid, EngineError> {
        self.guest_tokens
            .get(&token_digest(token))
            .map(|e| *e.value())
            .ok_or(EngineError::TokenNotFound)
    }

    pub async fn get_guest_booking(&self, token: &str) -> Result<Booking, EngineError> {
        let id = self.guest_booking_id(token)?;
        self.read_booking(&id)
            .await
            .map(|(b, _)| b)
            .ok_or(EngineError::NotFound("guest booking", id))
    }

    /// Guest self-service return, allowed from APPROVED or ONGOING.
    pub async fn complete_guest_booking(&self, token: &str) -> Result<Booking, EngineError> {
        let id = self.guest_booking_id(token)?;
        self.transition(id, Lane::Guest, Transition::Complete, Authority::TokenHolder, None)
            .await
    }

    pub async fn cancel_guest_booking(&self, token: &str, note: Option<String>) -> Result<Booking, EngineError> {
        let note = clean_note(note, false)?;
        let id = self.guest_booking_id(token)?;
        self.transition(id, Lane::Guest, Transition::Cancel, Authority::TokenHolder, note)
            .await
    }

    pub async fn approve_guest_booking(
        &self,
        id: Ulid,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Booking, EngineError> {
        let note = clean_note(note, false)?;
        self.transition(id, Lane::Guest, Transition::Approve, Authority::Member(actor), note)
            .await
    }

    pub async fn reject_guest_booking(
        &self,
        id: Ulid,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Booking, EngineError> {
        let note = clean_note(note, true)?;
        self.transition(id, Lane::Guest, Transition::Reject, Authority::Member(actor), note)
            .await
    }

    pub async fn start_guest_booking(&self, id: Ulid, actor: &Actor) -> Result<Booking, EngineError> {
        self.transition(id, Lane::Guest, Transition::Start, Authority::Member(actor), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_256_bit_hex_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_stable_and_hides_token() {
        let d = token_digest("tok123");
        assert_eq!(d, token_digest("tok123"));
        assert_ne!(d, token_digest("tok124"));
        assert!(!d.contains("tok123"));
        assert_eq!(d.len(), 64);
    }

    #[test]
    fn contact_requires_every_field() {
        let mut req = NewGuestBooking {
            resource_id: Ulid::new(),
            start: 0,
            end: 1,
            purpose: "p".into(),
            name: "Sari".into(),
            email: "sari@example.com".into(),
            phone: "0812".into(),
            department: "Finance".into(),
        };
        assert!(clean_contact(&req).is_ok());
        req.email = "not-an-email".into();
        assert!(matches!(clean_contact(&req), Err(EngineError::InvalidInput(_))));
        req.email = "sari@example.com".into();
        req.department = " ".into();
        assert!(matches!(clean_contact(&req), Err(EngineError::InvalidInput(_))));
    }
}
