//! Chat Page

use leptos::prelude::*;

use crate::api::{self, QuestionStream, StreamFrame};
use crate::components::{Bubble, MessageBubble, merge_transcript, push_step, settle, with_pending};

const DEFAULT_QUESTION: &str = "What is 10 percent of 100?";

#[component]
pub fn ChatPage() -> impl IntoView {
    let (bubbles, set_bubbles) = signal(Vec::<Bubble>::new());
    let (session_id, set_session_id) = signal(None::<String>);
    let (question, set_question) = signal(DEFAULT_QUESTION.to_string());
    let (api_key, set_api_key) = signal(String::new());
    let (server_key, set_server_key) = signal(false);
    let (model, set_model) = signal(String::new());
    let (loading, set_loading) = signal(false);
    let (error, set_error) = signal(None::<String>);
    let stream = StoredValue::new_local(None::<QuestionStream>);

    // Server status and a fresh session with the greeting
    leptos::task::spawn_local(async move {
        if let Ok(health) = api::health().await {
            set_server_key.set(health.server_key_configured);
            set_model.set(health.model);
        }
        match api::create_session().await {
            Ok(reply) => {
                set_session_id.set(Some(reply.session_id));
                set_bubbles.set(merge_transcript(&[], reply.turns, Vec::new()));
            }
            Err(e) => set_error.set(Some(e)),
        }
    });

    let has_key = move || server_key.get() || !api_key.get().trim().is_empty();

    let send = move |()| {
        if loading.get() {
            return;
        }

        let text = question.get();
        if text.trim().is_empty() {
            set_error.set(Some("Please enter a question".into()));
            return;
        }

        set_error.set(None);
        set_loading.set(true);

        let key = api_key.get();
        let key = Some(key.trim().to_string()).filter(|k| !k.is_empty());
        let id = session_id.get();

        let settled_len = bubbles.with(Vec::len);
        set_bubbles.update(|current| *current = with_pending(current, &text));

        let on_frame = move |frame: StreamFrame| match frame {
            StreamFrame::Step { event } => set_bubbles.update(|current| push_step(current, event)),
            StreamFrame::Token { .. } => {}
            StreamFrame::Turn { session_id, turn } => {
                set_session_id.set(Some(session_id));
                set_bubbles.update(|current| *current = settle(current, settled_len, turn));
                set_loading.set(false);
            }
            StreamFrame::Error { error, .. } => {
                set_bubbles.update(|current| current.truncate(settled_len));
                set_error.set(Some(error));
                set_loading.set(false);
            }
        };

        match QuestionStream::open(id.as_deref(), &text, key.as_deref(), on_frame) {
            Ok(open) => stream.set_value(Some(open)),
            // No WebSocket: ask over REST and show the steps afterwards
            Err(reason) => {
                leptos::logging::warn!("{reason}");
                leptos::task::spawn_local(async move {
                    match api::ask(id.as_deref(), &text, key.as_deref()).await {
                        Ok(reply) => {
                            set_session_id.set(Some(reply.session_id));
                            set_bubbles.update(|current| {
                                current.truncate(settled_len);
                                *current = merge_transcript(current, reply.turns, reply.steps);
                            });
                        }
                        Err(e) => {
                            set_bubbles.update(|current| current.truncate(settled_len));
                            set_error.set(Some(e));
                        }
                    }
                    set_loading.set(false);
                });
            }
        }
    };

    view! {
        <div class="chat">
            <aside class="sidebar">
                <h2>"Settings"</h2>
                <div class="field">
                    <label>"Insert Groq API key"</label>
                    <input
                        type="password"
                        prop:value=move || api_key.get()
                        on:input=move |ev| set_api_key.set(event_target_value(&ev))
                    />
                </div>
                <Show when=move || !model.get().is_empty()>
                    <p class="model">{move || format!("Model: {}", model.get())}</p>
                </Show>
            </aside>

            <main class="chat-main">
                <h1>"Maths Problem Solver using Google Gemma2 model"</h1>

                <Show
                    when=has_key
                    fallback=|| view! { <div class="info">"Please add the Groq API key"</div> }
                >
                    <div class="messages">
                        <For
                            each=move || bubbles.get()
                            key=|bubble| (bubble.index, bubble.steps.len(), bubble.turn.text.clone())
                            children=move |bubble| view! { <MessageBubble bubble=bubble /> }
                        />
                    </div>

                    <div class="input-area">
                        <label>"Ask a Question"</label>
                        <textarea
                            prop:value=move || question.get()
                            on:input=move |ev| set_question.set(event_target_value(&ev))
                        />
                        <button on:click=move |_| send(()) disabled=move || loading.get()>
                            "Find Answer"
                        </button>
                        <Show when=move || loading.get()>
                            <div class="spinner">"Generating answer..."</div>
                        </Show>
                        {move || error.get().map(|e| view! { <div class="error">{e}</div> })}
                    </div>
                </Show>
            </main>
        </div>
    }
}
