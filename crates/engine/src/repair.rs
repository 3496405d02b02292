//! Message consistency filter.
//!
//! Runs immediately before every backend call and guarantees two things
//! about the working list: no tool-result message survives without the
//! assistant message that requested it, and no disabled message survives
//! at all. A backend receiving either will misbehave or error.
//!
//! Single reverse pass: walking from the end, the tool results accumulated
//! so far form the *following run* of the first non-tool message
//! encountered. A disabled message takes its whole run down with it; a run
//! behind anything that is not an assistant message with pending calls is
//! orphaned (e.g. a transform replaced the originating assistant message)
//! and is removed on its own. The filter is idempotent.

use parley_core::message::Message;
use tracing::debug;

/// Repair the list in place.
pub fn repair(messages: &mut Vec<Message>) {
    let mut marked = vec![false; messages.len()];
    // Indices of the contiguous tool-result block following the message
    // currently under inspection.
    let mut run: Vec<usize> = Vec::new();

    for i in (0..messages.len()).rev() {
        let message = &messages[i];

        if message.is_tool_result() {
            if message.is_disabled() {
                marked[i] = true;
            }
            run.push(i);
            continue;
        }

        if message.is_disabled() {
            marked[i] = true;
            for &j in &run {
                marked[j] = true;
            }
        } else if !run.is_empty() && !message.requests_tools() {
            for &j in &run {
                marked[j] = true;
            }
        }
        run.clear();
    }

    // Whatever is left in `run` sits at the head of the list; a tool
    // result may never open a list.
    for &j in &run {
        marked[j] = true;
    }

    let doomed = marked.iter().filter(|&&m| m).count();
    if doomed > 0 {
        debug!(removed = doomed, "Consistency filter removed messages");
        let mut index = 0;
        messages.retain(|_| {
            let keep = !marked[index];
            index += 1;
            keep
        });
    }
}
