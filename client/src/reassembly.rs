use log::warn;

/// Fragments collected so far for one multi-part command response.
#[derive(Debug)]
pub struct ReassemblyState {
    expected_count: u8,
    parts: Vec<Option<Vec<u8>>>,
    received_count: u8,
}

impl ReassemblyState {
    fn new(expected_count: u8) -> Self {
        Self {
            expected_count,
            parts: vec![None; expected_count as usize],
            received_count: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.received_count == self.expected_count
    }

    /// Concatenates the parts by index, regardless of arrival order.
    fn join(self) -> Vec<u8> {
        self.parts.into_iter().flatten().flatten().collect()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum FragmentOutcome {
    Pending { received: u8, expected: u8 },
    Complete(Vec<u8>),
    Rejected(&'static str),
}

/// Single reassembly slot.
///
/// Only one command is ever in flight, so only one multi-part response can be
/// arriving at a time. Fragments are not keyed by sequence number.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    state: Option<ReassemblyState>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, total: u8, index: u8, data: &[u8]) -> FragmentOutcome {
        if total == 0 {
            return FragmentOutcome::Rejected("fragment declares zero parts");
        }
        if index >= total {
            return FragmentOutcome::Rejected("fragment index out of range");
        }

        if let Some(state) = &self.state {
            if state.expected_count != total {
                warn!(
                    "Fragment declares {} parts but {} were expected; discarding {} buffered parts",
                    total, state.expected_count, state.received_count
                );
                self.state = None;
            }
        }

        let state = self
            .state
            .get_or_insert_with(|| ReassemblyState::new(total));

        let slot = &mut state.parts[index as usize];
        if slot.is_none() {
            state.received_count += 1;
        }
        *slot = Some(data.to_vec());

        if state.is_complete() {
            let complete = self.state.take().map(ReassemblyState::join).unwrap_or_default();
            FragmentOutcome::Complete(complete)
        } else {
            FragmentOutcome::Pending {
                received: state.received_count,
                expected: state.expected_count,
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn clear(&mut self) {
        self.state = None;
    }
}
