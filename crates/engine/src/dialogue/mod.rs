use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

pub type NodeId = i32;

/// Next-node value that ends the conversation when its option is chosen.
pub const END_CONVERSATION: NodeId = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DialogueId(pub u32);

impl fmt::Display for DialogueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogueError {
    #[error("dialogue {0} not found")]
    DialogueNotFound(DialogueId),
    #[error("node {node} not found in dialogue {dialogue}")]
    NodeNotFound { dialogue: DialogueId, node: NodeId },
    #[error("option index {index} out of range for node {node} of dialogue {dialogue} ({count} options)")]
    OptionOutOfRange {
        dialogue: DialogueId,
        node: NodeId,
        index: usize,
        count: usize,
    },
}

pub type OptionCallback = Rc<dyn Fn()>;

#[derive(Clone)]
pub struct DialogueOption {
    pub text: String,
    pub next_node: NodeId,
    pub on_select: Option<OptionCallback>,
}

impl fmt::Debug for DialogueOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogueOption")
            .field("text", &self.text)
            .field("next_node", &self.next_node)
            .field("on_select", &self.on_select.as_ref().map(|_| ".."))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DialogueNode {
    pub id: NodeId,
    pub text: String,
    pub options: Vec<DialogueOption>,
}

impl DialogueNode {
    pub fn option_texts(&self) -> Vec<&str> {
        self.options.iter().map(|option| option.text.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Dialogue {
    pub id: DialogueId,
    pub name: String,
    pub nodes: BTreeMap<NodeId, DialogueNode>,
}

/// Receives nodes to show and picks options. Returning an index outside the
/// shown options ends the conversation.
pub trait DialogueDisplay {
    fn show(&mut self, text: &str, options: &[&str]);

    fn choose(&mut self, _option_count: usize) -> usize {
        usize::MAX
    }
}

/// Writes shown nodes to the log and never picks an option.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDialogueDisplay;

impl DialogueDisplay for LogDialogueDisplay {
    fn show(&mut self, text: &str, options: &[&str]) {
        info!(text, options = ?options, "dialogue_shown");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueStep {
    Advanced(NodeId),
    Ended,
}

#[derive(Debug)]
pub struct DialogueSystem {
    dialogues: BTreeMap<DialogueId, Dialogue>,
    next_id: u32,
}

impl Default for DialogueSystem {
    fn default() -> Self {
        Self {
            dialogues: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl DialogueSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_dialogue(&mut self, name: impl Into<String>) -> DialogueId {
        let id = DialogueId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        let name = name.into();
        info!(dialogue_id = id.0, name = %name, "dialogue_created");
        self.dialogues.insert(
            id,
            Dialogue {
                id,
                name,
                nodes: BTreeMap::new(),
            },
        );
        id
    }

    pub fn contains(&self, id: DialogueId) -> bool {
        self.dialogues.contains_key(&id)
    }

    pub fn dialogue(&self, id: DialogueId) -> Option<&Dialogue> {
        self.dialogues.get(&id)
    }

    pub fn node(&self, id: DialogueId, node_id: NodeId) -> Option<&DialogueNode> {
        self.dialogues.get(&id)?.nodes.get(&node_id)
    }

    pub fn dialogue_ids(&self) -> Vec<DialogueId> {
        self.dialogues.keys().copied().collect()
    }

    /// Inserts a node with no options, replacing any node with the same id.
    pub fn add_node(
        &mut self,
        id: DialogueId,
        node_id: NodeId,
        text: impl Into<String>,
    ) -> Result<(), DialogueError> {
        let dialogue = self.dialogue_mut(id)?;
        dialogue.nodes.insert(
            node_id,
            DialogueNode {
                id: node_id,
                text: text.into(),
                options: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn remove_node(&mut self, id: DialogueId, node_id: NodeId) -> Result<(), DialogueError> {
        let dialogue = self.dialogue_mut(id)?;
        dialogue
            .nodes
            .remove(&node_id)
            .map(|_| ())
            .ok_or(DialogueError::NodeNotFound {
                dialogue: id,
                node: node_id,
            })
    }

    pub fn add_option(
        &mut self,
        id: DialogueId,
        node_id: NodeId,
        text: impl Into<String>,
        next_node: NodeId,
        on_select: Option<OptionCallback>,
    ) -> Result<(), DialogueError> {
        self.node_mut(id, node_id)?.options.push(DialogueOption {
            text: text.into(),
            next_node,
            on_select,
        });
        Ok(())
    }

    pub fn remove_option(
        &mut self,
        id: DialogueId,
        node_id: NodeId,
        index: usize,
    ) -> Result<(), DialogueError> {
        let node = self.node_mut(id, node_id)?;
        check_option_index(id, node, index)?;
        node.options.remove(index);
        Ok(())
    }

    pub fn update_node_text(
        &mut self,
        id: DialogueId,
        node_id: NodeId,
        text: impl Into<String>,
    ) -> Result<(), DialogueError> {
        self.node_mut(id, node_id)?.text = text.into();
        Ok(())
    }

    pub fn update_option_text(
        &mut self,
        id: DialogueId,
        node_id: NodeId,
        index: usize,
        text: impl Into<String>,
    ) -> Result<(), DialogueError> {
        let node = self.node_mut(id, node_id)?;
        check_option_index(id, node, index)?;
        node.options[index].text = text.into();
        Ok(())
    }

    pub fn remove_dialogue(&mut self, id: DialogueId) -> Result<(), DialogueError> {
        self.dialogues
            .remove(&id)
            .ok_or(DialogueError::DialogueNotFound(id))?;
        info!(dialogue_id = id.0, "dialogue_removed");
        Ok(())
    }

    /// Copies every node and option under a fresh id. Option callbacks are
    /// shared with the source.
    pub fn clone_dialogue(&mut self, source: DialogueId) -> Result<DialogueId, DialogueError> {
        let template = self
            .dialogues
            .get(&source)
            .ok_or(DialogueError::DialogueNotFound(source))?;
        let name = format!("{} (Clone)", template.name);
        let nodes = template.nodes.clone();
        let id = self.create_dialogue(name);
        if let Some(dialogue) = self.dialogues.get_mut(&id) {
            dialogue.nodes = nodes;
        }
        Ok(id)
    }

    /// Applies one caller-driven selection on `node_id`. An index past the
    /// node's options ends the conversation; the chosen option's callback runs
    /// before its next node is resolved.
    pub fn select_option(
        &self,
        id: DialogueId,
        node_id: NodeId,
        index: usize,
    ) -> Result<DialogueStep, DialogueError> {
        let node = self.node_ref(id, node_id)?;
        let Some(option) = node.options.get(index) else {
            debug!(dialogue_id = id.0, node_id, index, "dialogue_ended_by_selection");
            return Ok(DialogueStep::Ended);
        };
        if let Some(on_select) = option.on_select.clone() {
            on_select();
        }
        if option.next_node == END_CONVERSATION {
            return Ok(DialogueStep::Ended);
        }
        self.node_ref(id, option.next_node)?;
        Ok(DialogueStep::Advanced(option.next_node))
    }

    /// Shows `start_node` and keeps asking `display` for selections until the
    /// conversation ends. Returns the ids of every node shown, in order.
    pub fn run_conversation(
        &self,
        id: DialogueId,
        start_node: NodeId,
        display: &mut dyn DialogueDisplay,
    ) -> Result<Vec<NodeId>, DialogueError> {
        let mut current = self.node_ref(id, start_node)?;
        let mut shown = vec![current.id];
        display.show(&current.text, &current.option_texts());

        loop {
            let selection = display.choose(current.options.len());
            match self.select_option(id, current.id, selection)? {
                DialogueStep::Ended => return Ok(shown),
                DialogueStep::Advanced(next) => {
                    current = self.node_ref(id, next)?;
                    shown.push(next);
                    display.show(&current.text, &current.option_texts());
                }
            }
        }
    }

    fn dialogue_mut(&mut self, id: DialogueId) -> Result<&mut Dialogue, DialogueError> {
        self.dialogues
            .get_mut(&id)
            .ok_or(DialogueError::DialogueNotFound(id))
    }

    fn node_ref(&self, id: DialogueId, node_id: NodeId) -> Result<&DialogueNode, DialogueError> {
        let dialogue = self
            .dialogues
            .get(&id)
            .ok_or(DialogueError::DialogueNotFound(id))?;
        dialogue.nodes.get(&node_id).ok_or(DialogueError::NodeNotFound {
            dialogue: id,
            node: node_id,
        })
    }

    fn node_mut(&mut self, id: DialogueId, node_id: NodeId) -> Result<&mut DialogueNode, DialogueError> {
        self.dialogue_mut(id)?
            .nodes
            .get_mut(&node_id)
            .ok_or(DialogueError::NodeNotFound {
                dialogue: id,
                node: node_id,
            })
    }
}

fn check_option_index(id: DialogueId, node: &DialogueNode, index: usize) -> Result<(), DialogueError> {
    if index < node.options.len() {
        return Ok(());
    }
    Err(DialogueError::OptionOutOfRange {
        dialogue: id,
        node: node.id,
        index,
        count: node.options.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    struct ScriptedDisplay {
        shown: Vec<(String, Vec<String>)>,
        choices: VecDeque<usize>,
    }

    impl DialogueDisplay for ScriptedDisplay {
        fn show(&mut self, text: &str, options: &[&str]) {
            self.shown.push((
                text.to_string(),
                options.iter().map(|option| option.to_string()).collect(),
            ));
        }

        fn choose(&mut self, _option_count: usize) -> usize {
            self.choices.pop_front().unwrap_or(usize::MAX)
        }
    }

    fn greeting_dialogue(system: &mut DialogueSystem) -> DialogueId {
        let id = system.create_dialogue("Greeting");
        system.add_node(id, 1, "Hello, traveller.").expect("node 1");
        system
            .add_option(id, 1, "Who are you?", 2, None)
            .expect("option");
        system.add_node(id, 2, "I keep the gate.").expect("node 2");
        id
    }

    #[test]
    fn dialogue_ids_start_at_one() {
        let mut system = DialogueSystem::new();
        assert_eq!(system.create_dialogue("a"), DialogueId(1));
        assert_eq!(system.create_dialogue("b"), DialogueId(2));
        assert_eq!(system.dialogue_ids(), vec![DialogueId(1), DialogueId(2)]);
    }

    #[test]
    fn selecting_first_option_resolves_to_next_node_text() {
        let mut system = DialogueSystem::new();
        let id = greeting_dialogue(&mut system);
        let mut display = ScriptedDisplay {
            choices: VecDeque::from([0]),
            ..ScriptedDisplay::default()
        };
        let shown = system.run_conversation(id, 1, &mut display).expect("run");
        assert_eq!(shown, vec![1, 2]);
        assert_eq!(display.shown[0].1, vec!["Who are you?".to_string()]);
        assert_eq!(display.shown[1].0, "I keep the gate.");
    }

    #[test]
    fn out_of_range_selection_ends_without_error() {
        let mut system = DialogueSystem::new();
        let id = greeting_dialogue(&mut system);
        assert_eq!(system.select_option(id, 1, 1), Ok(DialogueStep::Ended));
        assert_eq!(system.select_option(id, 1, 0), Ok(DialogueStep::Advanced(2)));

        let mut display = ScriptedDisplay {
            choices: VecDeque::from([5]),
            ..ScriptedDisplay::default()
        };
        let shown = system.run_conversation(id, 1, &mut display).expect("run");
        assert_eq!(shown, vec![1]);
    }

    #[test]
    fn callback_runs_before_sentinel_ends_conversation() {
        let mut system = DialogueSystem::new();
        let id = system.create_dialogue("Farewell");
        system.add_node(id, 10, "Safe travels.").expect("node");
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        system
            .add_option(
                id,
                10,
                "Goodbye",
                END_CONVERSATION,
                Some(Rc::new(move || counter.set(counter.get() + 1))),
            )
            .expect("option");
        assert_eq!(system.select_option(id, 10, 0), Ok(DialogueStep::Ended));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn missing_ids_signal_distinct_failures() {
        let mut system = DialogueSystem::new();
        let id = greeting_dialogue(&mut system);
        let missing = DialogueId(40);
        assert_eq!(
            system.add_node(missing, 1, "x"),
            Err(DialogueError::DialogueNotFound(missing))
        );
        assert_eq!(
            system.update_node_text(id, 9, "x"),
            Err(DialogueError::NodeNotFound { dialogue: id, node: 9 })
        );
        assert_eq!(
            system.remove_option(id, 1, 3),
            Err(DialogueError::OptionOutOfRange {
                dialogue: id,
                node: 1,
                index: 3,
                count: 1
            })
        );
        assert_eq!(
            system.remove_dialogue(missing),
            Err(DialogueError::DialogueNotFound(missing))
        );
        assert!(system.node(missing, 1).is_none());
    }

    #[test]
    fn option_pointing_at_missing_node_is_not_found() {
        let mut system = DialogueSystem::new();
        let id = system.create_dialogue("Broken");
        system.add_node(id, 1, "...").expect("node");
        system.add_option(id, 1, "Go on", 7, None).expect("option");
        assert_eq!(
            system.select_option(id, 1, 0),
            Err(DialogueError::NodeNotFound { dialogue: id, node: 7 })
        );
    }

    #[test]
    fn clone_copies_nodes_under_new_name() {
        let mut system = DialogueSystem::new();
        let id = greeting_dialogue(&mut system);
        let copy = system.clone_dialogue(id).expect("clone");
        assert_ne!(copy, id);
        let cloned = system.dialogue(copy).expect("cloned dialogue");
        assert_eq!(cloned.name, "Greeting (Clone)");
        assert_eq!(cloned.nodes.len(), 2);

        system.update_option_text(copy, 1, 0, "Name yourself").expect("update");
        assert_eq!(
            system.node(id, 1).expect("original").options[0].text,
            "Who are you?"
        );
    }

    #[test]
    fn re_adding_a_node_replaces_its_options() {
        let mut system = DialogueSystem::new();
        let id = greeting_dialogue(&mut system);
        system.add_node(id, 1, "Begone.").expect("replace");
        let node = system.node(id, 1).expect("node");
        assert_eq!(node.text, "Begone.");
        assert!(node.options.is_empty());

        system.remove_node(id, 1).expect("remove");
        assert!(system.node(id, 1).is_none());
    }
}
