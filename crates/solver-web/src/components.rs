//! UI Components

use leptos::prelude::*;

use crate::api::{ChatTurn, Step};

/// A transcript turn plus the agent steps that produced it
#[derive(Clone, Debug, PartialEq)]
pub struct Bubble {
    pub index: usize,
    pub turn: ChatTurn,
    pub steps: Vec<Step>,
}

/// Rebuild the bubbles from a fresh transcript, keeping steps already shown
/// and attaching `steps` to the newest assistant turn
pub fn merge_transcript(previous: &[Bubble], turns: Vec<ChatTurn>, steps: Vec<Step>) -> Vec<Bubble> {
    let mut bubbles: Vec<Bubble> = turns
        .into_iter()
        .enumerate()
        .map(|(index, turn)| Bubble {
            index,
            turn,
            steps: previous
                .get(index)
                .map(|b| b.steps.clone())
                .unwrap_or_default(),
        })
        .collect();

    if let Some(last) = bubbles.iter_mut().rev().find(|b| b.turn.role == "assistant") {
        if last.index >= previous.len() {
            last.steps = steps;
        }
    }

    bubbles
}

/// Append the question and an empty assistant bubble that collects live steps
pub fn with_pending(settled: &[Bubble], question: &str) -> Vec<Bubble> {
    let mut bubbles = settled.to_vec();
    for (role, text) in [("user", question), ("assistant", "")] {
        bubbles.push(Bubble {
            index: bubbles.len(),
            turn: ChatTurn {
                role: role.into(),
                text: text.into(),
            },
            steps: Vec::new(),
        });
    }
    bubbles
}

/// Add a live step to the pending assistant bubble
pub fn push_step(bubbles: &mut [Bubble], step: Step) {
    if let Some(pending) = bubbles.last_mut().filter(|b| b.turn.text.is_empty()) {
        pending.steps.push(step);
    }
}

/// Replace the pending bubble with the answer, keeping the steps it collected
pub fn settle(bubbles: &[Bubble], settled_len: usize, answer: ChatTurn) -> Vec<Bubble> {
    let steps = bubbles.last().map(|b| b.steps.clone()).unwrap_or_default();
    let mut turns: Vec<ChatTurn> = bubbles
        .iter()
        .take(bubbles.len().saturating_sub(1))
        .map(|b| b.turn.clone())
        .collect();
    turns.push(answer);

    merge_transcript(&bubbles[..settled_len.min(bubbles.len())], turns, steps)
}

/// Collapsed list of agent steps
#[component]
pub fn StepList(steps: Vec<Step>) -> impl IntoView {
    let items: Vec<_> = steps.iter().filter_map(Step::describe).collect();
    let count = items.len();

    (count > 0).then(|| {
        view! {
            <details class="steps">
                <summary>{format!("Show reasoning ({count} steps)")}</summary>
                <ol>
                    {items
                        .into_iter()
                        .map(|(heading, body)| view! {
                            <li>
                                <strong>{heading}</strong>
                                <pre>{body}</pre>
                            </li>
                        })
                        .collect_view()}
                </ol>
            </details>
        }
    })
}

/// Message bubble component
#[component]
pub fn MessageBubble(bubble: Bubble) -> impl IntoView {
    let class = format!("message message-{}", bubble.turn.role);
    let avatar = if bubble.turn.role == "user" { "🧑" } else { "🤖" };

    let pending = bubble.turn.role == "assistant" && bubble.turn.text.is_empty();
    let text = if pending { "…".to_string() } else { bubble.turn.text.clone() };

    view! {
        <div class=class>
            <span class="role">{avatar}</span>
            <div class="body">
                <StepList steps=bubble.steps.clone() />
                <p class="content">{text}</p>
            </div>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, text: &str) -> ChatTurn {
        ChatTurn {
            role: role.into(),
            text: text.into(),
        }
    }

    fn thought(text: &str) -> Step {
        Step::Thought { text: text.into() }
    }

    #[test]
    fn test_steps_attach_to_new_answer_only() {
        let greeting = vec![turn("assistant", "Hello! I am your mathematical assistant.")];
        let first = merge_transcript(&[], greeting, Vec::new());
        assert_eq!(first.len(), 1);
        assert!(first[0].steps.is_empty());

        let turns = vec![
            turn("assistant", "Hello! I am your mathematical assistant."),
            turn("user", "2 + 2?"),
            turn("assistant", "4"),
        ];
        let second = merge_transcript(&first, turns.clone(), vec![thought("add")]);
        assert!(second[0].steps.is_empty());
        assert_eq!(second[2].steps, vec![thought("add")]);

        let mut more = turns;
        more.push(turn("user", "3 + 3?"));
        more.push(turn("assistant", "6"));
        let third = merge_transcript(&second, more, vec![thought("again")]);
        assert_eq!(third[2].steps, vec![thought("add")]);
        assert_eq!(third[4].steps, vec![thought("again")]);
    }

    #[test]
    fn test_live_steps_settle_on_answer() {
        let settled = merge_transcript(
            &[],
            vec![turn("assistant", "Hello! I am your mathematical assistant.")],
            Vec::new(),
        );

        let mut live = with_pending(&settled, "2 + 2?");
        assert_eq!(live.len(), 3);
        assert_eq!(live[1].turn, turn("user", "2 + 2?"));
        assert!(live[2].turn.text.is_empty());

        push_step(&mut live, thought("add them"));
        push_step(&mut live, Step::Token { delta: "4".into() });
        assert_eq!(live[2].steps.len(), 2);
        assert!(live[0].steps.is_empty());

        let done = settle(&live, settled.len(), turn("assistant", "4"));
        assert_eq!(done.len(), 3);
        assert_eq!(done[2].turn, turn("assistant", "4"));
        assert_eq!(done[2].steps.len(), 2);
        assert!(done[0].steps.is_empty());

        // Settled bubbles ignore late steps
        let mut after = done.clone();
        push_step(&mut after, thought("late"));
        assert_eq!(after, done);
    }
}
