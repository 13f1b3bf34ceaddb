//! # Codementor Agent
//!
//! A supervisor that never hands the student a solution:
//! 1. A question with code goes to the `solving_agent`
//! 2. The solution goes to the `mentor_agent`, which writes five hints
//! 3. The supervisor checks the hints, stores them as a memory and replies
//! 4. Follow-up turns on the same thread recall stored hints by similarity
//!
//! Agents talk through handoff tools; control always returns to the
//! supervisor.

pub mod app;
pub mod handoff;
pub mod hints;
pub mod memory_tools;
pub mod prompts;
pub mod react;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use app::{create_agent_app, create_agent_app_with, MentorApp, MentorAppBuilder, TurnOutcome, MENTOR_NAME, SOLVER_NAME};
pub use handoff::{handoff_messages, handoff_target, handoff_tool_name, HandoffReview, HandoffTool};
pub use hints::{leaked_lines, strip_review_notes, HintBatch, MentorReview, HINTS_PER_BATCH, REVIEW_NOTE_TAG};
pub use memory_tools::{memories_namespace, ManageMemoryTool, SearchMemoryTool};
pub use react::{AgentBuilder, AgentRun, ReactAgent, StaticPrompt, SystemPrompt, DEFAULT_MAX_STEPS};
pub use supervisor::{create_supervisor, MemoryPrompt, SUPERVISOR_NAME};
