//! Session effect types.
//!
//! Effects are commands returned by the session reducer that the runtime
//! executes. The only effect is a provider call; the reducer never performs
//! I/O itself.

/// Identifies one provider call. Allocated by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(pub u64);

#[derive(Debug, Default)]
pub struct TicketSeq {
    next: u64,
}

impl TicketSeq {
    pub fn next_ticket(&mut self, purpose: TicketPurpose) -> GenerationTicket {
        let id = TicketId(self.next);
        self.next = self.next.wrapping_add(1);
        GenerationTicket { id, purpose }
    }
}

/// Why a call was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketPurpose {
    /// Start, retry, or a confirm that had no usable speculation.
    Explicit,
    /// Prefetch for a divergent candidate before confirmation.
    Speculation { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTicket {
    pub id: TicketId,
    pub purpose: TicketPurpose,
}

impl GenerationTicket {
    pub fn is_speculation(&self) -> bool {
        matches!(self.purpose, TicketPurpose::Speculation { .. })
    }
}

/// Effects returned by the session for the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Perform one provider call for `prompt` and report the outcome back
    /// through `Session::settle` with the same ticket.
    Generate {
        ticket: GenerationTicket,
        prompt: String,
    },
}
