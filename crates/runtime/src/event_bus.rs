/// Structured trace event.
///
/// `subject` names the item the event is about (a panorama id) when there is
/// one; `sequence` orders events globally since frame indices restart per
/// render loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub sequence: u64,
    pub kind: &'static str,
    pub subject: Option<String>,
    pub message: String,
}

/// Bounded in-memory event log.
#[derive(Debug)]
pub struct EventBus {
    next_sequence: u64,
    capacity: usize,
    events: Vec<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` events; the oldest are dropped first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_sequence: 0,
            capacity: capacity.max(1),
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, kind: &'static str, subject: Option<&str>, message: impl Into<String>) {
        if self.events.len() == self.capacity {
            self.events.remove(0);
        }
        self.events.push(Event {
            sequence: self.next_sequence,
            kind,
            subject: subject.map(str::to_string),
            message: message.into(),
        });
        self.next_sequence += 1;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events of one kind, oldest first.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Subjects of every event of `kind`, oldest first.
    pub fn subjects(&self, kind: &str) -> Vec<String> {
        self.of_kind(kind)
            .filter_map(|e| e.subject.clone())
            .collect()
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
