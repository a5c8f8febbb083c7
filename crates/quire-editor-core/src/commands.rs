//! Slash-command registry.
//!
//! Typing `/` in an empty block opens a menu of [`SlashCommand`]s filtered by
//! what follows the slash. Each command is a plain function over an
//! [`EditorHandle`], so the menu works the same on plain and replicated
//! editors.

use std::fmt;

use crate::actions::EditorAction;
use crate::document::NodePath;
use crate::execute::execute_action;
use crate::handle::EditorHandle;
use crate::media::{MediaAttrs, MediaStatus};
use crate::node::{Node, NodeType};
use crate::schema::{self, SchemaViolation};

/// Command handler. Returns `Ok(false)` when the command does not apply at
/// the current selection.
pub type CommandFn = fn(&mut dyn EditorHandle) -> Result<bool, SchemaViolation>;

/// A command shown in the slash menu.
#[derive(Clone, Copy)]
pub struct SlashCommand {
    /// Menu label (e.g., "Heading").
    pub title: &'static str,
    /// One-line help shown under the label.
    pub description: &'static str,
    /// Icon name for the host to render.
    pub icon: &'static str,
    /// The command itself.
    pub command: CommandFn,
}

impl fmt::Debug for SlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlashCommand")
            .field("title", &self.title)
            .field("description", &self.description)
            .field("icon", &self.icon)
            .finish()
    }
}

impl SlashCommand {
    fn matches(&self, query: &str) -> bool {
        self.title.to_lowercase().contains(query) || self.description.to_lowercase().contains(query)
    }
}

/// Ordered set of slash commands.
#[derive(Clone, Debug)]
pub struct CommandRegistry {
    commands: Vec<SlashCommand>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self {
            commands: DEFAULT_COMMANDS.to_vec(),
        }
    }
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Add a command, replacing any with the same title.
    pub fn register(&mut self, command: SlashCommand) {
        match self.commands.iter_mut().find(|c| c.title == command.title) {
            Some(existing) => *existing = command,
            None => self.commands.push(command),
        }
    }

    pub fn commands(&self) -> &[SlashCommand] {
        &self.commands
    }

    /// Commands whose title or description contains `query`, ignoring case,
    /// in registration order.
    pub fn filter(&self, query: &str) -> Vec<&SlashCommand> {
        let query = query.trim().to_lowercase();
        self.commands.iter().filter(|c| c.matches(&query)).collect()
    }

    pub fn find(&self, title: &str) -> Option<&SlashCommand> {
        self.commands
            .iter()
            .find(|c| c.title.eq_ignore_ascii_case(title))
    }

    /// Run the command titled `title`. `Ok(false)` if there is none.
    pub fn run(&self, title: &str, ed: &mut dyn EditorHandle) -> Result<bool, SchemaViolation> {
        match self.find(title) {
            Some(command) => {
                tracing::debug!(command = command.title, "running slash command");
                (command.command)(ed)
            }
            None => Ok(false),
        }
    }
}

pub const DEFAULT_COMMANDS: &[SlashCommand] = &[
    SlashCommand {
        title: "Heading",
        description: "Section heading",
        icon: "heading",
        command: |ed| toggle_current(ed, NodeType::Heading),
    },
    SlashCommand {
        title: "Quote",
        description: "Capture a quotation",
        icon: "quote",
        command: |ed| wrap_current(ed, NodeType::Quote),
    },
    SlashCommand {
        title: "Code",
        description: "Code block",
        icon: "code",
        command: |ed| toggle_current(ed, NodeType::Code),
    },
    SlashCommand {
        title: "List",
        description: "Bulleted list",
        icon: "list",
        command: |ed| wrap_current(ed, NodeType::List),
    },
    SlashCommand {
        title: "Task list",
        description: "List with checkboxes",
        icon: "checklist",
        command: |ed| wrap_current(ed, NodeType::TaskList),
    },
    SlashCommand {
        title: "Image",
        description: "Upload or embed an image",
        icon: "image",
        command: |ed| {
            let placeholder = MediaAttrs {
                status: Some(MediaStatus::Uploading),
                ..MediaAttrs::default()
            };
            execute_action(
                ed,
                &EditorAction::InsertNode {
                    node: placeholder.into_node(),
                },
            )
        },
    },
];

/// Path of the text leaf holding the caret.
fn current_leaf(ed: &dyn EditorHandle) -> Option<NodePath> {
    let sel = ed.selection().as_text()?;
    ed.document().text_leaf_at(sel.head).map(|l| l.path)
}

fn toggle_current(ed: &mut dyn EditorHandle, node_type: NodeType) -> Result<bool, SchemaViolation> {
    let Some(path) = current_leaf(ed) else {
        return Ok(false);
    };
    ed.toggle_node_type(&path, node_type)?;
    Ok(true)
}

/// Wrap the caret's block in a container, or retype the container it is
/// already in.
fn wrap_current(ed: &mut dyn EditorHandle, container: NodeType) -> Result<bool, SchemaViolation> {
    let Some(path) = current_leaf(ed) else {
        return Ok(false);
    };
    let Some((parent, index)) = path.split_last() else {
        return Ok(false);
    };

    if !parent.is_root() {
        ed.toggle_node_type(&parent, container)?;
        return Ok(true);
    }

    let Some(node) = ed.document().node(&path).cloned() else {
        return Ok(false);
    };
    if !schema::allows_child(container, node.node_type) {
        return Err(SchemaViolation::UnexpectedNode {
            parent: container.as_str().into(),
            child: node.node_type,
            index: 0,
        });
    }
    let offset = ed
        .selection()
        .as_text()
        .and_then(|s| ed.document().resolve_text(s.head))
        .map_or(0, |at| at.offset);

    ed.insert_node(
        &parent,
        index + 1,
        Node::with_children(container, vec![node]),
    )?;
    ed.delete_node(&path)?;
    ed.focus_node(&path.child(0), offset);
    Ok(true)
}
