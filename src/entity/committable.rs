use super::Entity;

/// A set of entities the writer persists in one commit.
///
/// Outbox messages handed to `TransactionalWriter::outbox` ride on the first
/// entity returned, so order matters.
pub trait Committable {
    fn entities_mut(&mut self) -> Vec<&mut Entity>;
}

impl Committable for Entity {
    fn entities_mut(&mut self) -> Vec<&mut Entity> {
        vec![self]
    }
}

impl Committable for [&mut Entity] {
    fn entities_mut(&mut self) -> Vec<&mut Entity> {
        self.iter_mut().map(|entity| &mut **entity).collect()
    }
}

impl<const N: usize> Committable for [&mut Entity; N] {
    fn entities_mut(&mut self) -> Vec<&mut Entity> {
        self.as_mut_slice().entities_mut()
    }
}

impl Committable for Vec<&mut Entity> {
    fn entities_mut(&mut self) -> Vec<&mut Entity> {
        self.as_mut_slice().entities_mut()
    }
}
