pub type SubscriberId = String;

/// Represents one destination's membership inside the engine.
///
/// A route tracks the subscribers attached to a queue or topic. For
/// topics every member receives each message; for queues the engine
/// walks the members round-robin and hands each message to exactly one,
/// using `cursor` to remember where the rotation left off.
#[derive(Debug, Default)]
pub struct Route {
    pub members: Vec<SubscriberId>,
    pub cursor: usize,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber to the route. Duplicate ids have no effect.
    pub fn subscribe(&mut self, id: SubscriberId) {
        if !self.members.contains(&id) {
            self.members.push(id);
        }
    }

    /// Removes a subscriber from the route. Unknown ids have no effect.
    pub fn unsubscribe(&mut self, id: &SubscriberId) {
        if let Some(pos) = self.members.iter().position(|m| m == id) {
            self.members.remove(pos);
            if pos < self.cursor {
                self.cursor -= 1;
            }
            if self.members.is_empty() {
                self.cursor = 0;
            } else {
                self.cursor %= self.members.len();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
