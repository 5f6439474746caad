use std::ops::Deref;
use std::rc::Rc;

use chrono::{DateTime, Local, Utc};
use donemate_core::auth::{AuthForm, AuthMode};
use donemate_core::identity::{IdentityProvider, OAuthProvider};
use donemate_core::task::{Task, TaskId, TaskStats};
use donemate_core::theme::ThemePreference;
use web_sys::{HtmlInputElement, InputEvent, KeyboardEvent, MouseEvent, SubmitEvent};
use yew::{
    Callback, Html, Properties, Reducible, TargetCast, UseReducerHandle, classes,
    function_component, html, use_reducer, use_state,
};

const TAGLINE: &str = "Focus. Finish. Repeat.";

fn input_value(event: InputEvent) -> String {
    event.target_unchecked_into::<HtmlInputElement>().value()
}

fn clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

#[function_component(LoadingScreen)]
pub fn loading_screen() -> Html {
    html! {
        <div class="loading-container">
            <div class="loading-screen">
                <div class="loader">
                    <h2>{ "DoneMate" }</h2>
                    <p>{ TAGLINE }</p>
                </div>
            </div>
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct HeaderProps {
    pub theme: ThemePreference,
    pub on_toggle_theme: Callback<()>,
    #[prop_or_default]
    pub user_label: Option<String>,
    #[prop_or_default]
    pub on_logout: Option<Callback<()>>,
}

#[function_component(Header)]
pub fn header(props: &HeaderProps) -> Html {
    let on_toggle_theme = props.on_toggle_theme.clone();
    let theme_label = match props.theme {
        ThemePreference::Light => "Dark mode",
        ThemePreference::Dark => "Light mode",
    };

    html! {
        <header class="dm-header">
            <div class="header-inner">
                <div class="title">
                    <div class="brand"><h1>{ "DoneMate" }</h1></div>
                    <p class="tagline">{ TAGLINE }</p>
                </div>
                <div class="header-right">
                    {
                        if let Some(label) = &props.user_label {
                            html! { <span class="muted user-label">{ label }</span> }
                        } else {
                            html! {}
                        }
                    }
                    <button class="toggletheme" title={theme_label} onclick={move |_| on_toggle_theme.emit(())}>
                        { theme_label }
                    </button>
                    {
                        if let Some(on_logout) = props.on_logout.clone() {
                            html! { <button class="btn ghost" onclick={move |_| on_logout.emit(())}>{ "Log out" }</button> }
                        } else {
                            html! {}
                        }
                    }
                </div>
            </div>
        </header>
    }
}

#[derive(Properties, PartialEq)]
pub struct AddBarProps {
    pub on_add: Callback<String>,
}

/// Text input that submits on Enter. Blank text never reaches `on_add`.
#[function_component(AddBar)]
pub fn add_bar(props: &AddBarProps) -> Html {
    let text = use_state(String::new);

    let oninput = {
        let text = text.clone();
        Callback::from(move |e: InputEvent| text.set(input_value(e)))
    };

    let onsubmit = {
        let text = text.clone();
        let on_add = props.on_add.clone();
        Callback::from(move |e: SubmitEvent| {
            e.prevent_default();
            let value = text.trim().to_string();
            if value.is_empty() {
                return;
            }
            on_add.emit(value);
            text.set(String::new());
        })
    };

    html! {
        <form class="add-bar" {onsubmit}>
            <input
                class="add-input"
                value={(*text).clone()}
                {oninput}
                placeholder="Add new task, press Enter to add"
                aria-label="Add new task"
            />
            <button class="btn add" type="submit" disabled={text.trim().is_empty()}>{ "Add" }</button>
        </form>
    }
}

#[derive(Properties, PartialEq)]
pub struct TaskItemProps {
    pub task: Task,
    pub on_toggle: Callback<TaskId>,
    pub on_ask_delete: Callback<TaskId>,
    pub on_edit: Callback<TaskId>,
}

#[function_component(TaskItem)]
pub fn task_item(props: &TaskItemProps) -> Html {
    let id = props.task.id();
    let on_toggle = props.on_toggle.clone();
    let on_ask_delete = props.on_ask_delete.clone();
    let on_edit = props.on_edit.clone();
    let description = props.task.description().to_string();

    html! {
        <li class="task-card" aria-live="polite">
            <div class="task-left">
                <label class="checkbox">
                    <input type="checkbox" checked={props.task.is_packed()} onchange={move |_| on_toggle.emit(id)} />
                    <span class="checkmark" />
                </label>
                <div class="task-content">
                    <div class={classes!("task-desc", props.task.is_packed().then_some("completed"))}>
                        { &description }
                    </div>
                    <div class="meta">
                        <span class="muted">{ format!("Added: {}", clock(props.task.created_at())) }</span>
                        {
                            if let Some(done_at) = props.task.done_at() {
                                html! { <span class="muted">{ format!(" • Done: {}", clock(done_at)) }</span> }
                            } else {
                                html! {}
                            }
                        }
                    </div>
                </div>
            </div>
            <div class="task-actions">
                <button class="icon-btn" title="Edit" aria-label={format!("Edit {description}")} onclick={move |_| on_edit.emit(id)}>
                    { "Edit" }
                </button>
                <button class="icon-btn danger" title="Delete" aria-label={format!("Delete {description}")} onclick={move |_| on_ask_delete.emit(id)}>
                    { "Delete" }
                </button>
            </div>
        </li>
    }
}

#[derive(Properties, PartialEq)]
pub struct ConfirmModalProps {
    pub title: String,
    pub description: String,
    pub on_confirm: Callback<()>,
    pub on_cancel: Callback<()>,
}

#[function_component(ConfirmModal)]
pub fn confirm_modal(props: &ConfirmModalProps) -> Html {
    let on_confirm = props.on_confirm.clone();
    let on_cancel = props.on_cancel.clone();
    let on_overlay = props.on_cancel.clone();

    html! {
        <>
            <div class="overlay" onclick={move |_| on_overlay.emit(())} />
            <div class="modal confirm-modal" role="dialog" aria-modal="true">
                <h3>{ &props.title }</h3>
                <p class="muted">{ &props.description }</p>
                <div class="modal-actions">
                    <button class="btn danger" onclick={move |_| on_confirm.emit(())}>{ "Delete" }</button>
                    <button class="btn ghost" onclick={move |_| on_cancel.emit(())}>{ "Cancel" }</button>
                </div>
            </div>
        </>
    }
}

#[derive(Properties, PartialEq)]
pub struct EditModalProps {
    pub task: Task,
    pub on_save: Callback<(TaskId, String)>,
    pub on_cancel: Callback<()>,
}

#[function_component(EditModal)]
pub fn edit_modal(props: &EditModalProps) -> Html {
    let draft = {
        let initial = props.task.description().to_string();
        use_state(move || initial)
    };
    let id = props.task.id();

    let save = {
        let draft = draft.clone();
        let on_save = props.on_save.clone();
        Callback::from(move |()| {
            let value = draft.trim().to_string();
            if !value.is_empty() {
                on_save.emit((id, value));
            }
        })
    };

    let oninput = {
        let draft = draft.clone();
        Callback::from(move |e: InputEvent| draft.set(input_value(e)))
    };

    let onkeydown = {
        let save = save.clone();
        let on_cancel = props.on_cancel.clone();
        Callback::from(move |e: KeyboardEvent| match e.key().as_str() {
            "Enter" => save.emit(()),
            "Escape" => on_cancel.emit(()),
            _ => {}
        })
    };

    let on_cancel = props.on_cancel.clone();
    let on_overlay = props.on_cancel.clone();

    html! {
        <>
            <div class="overlay" onclick={move |_| on_overlay.emit(())} />
            <div class="modal edit-modal" role="dialog" aria-modal="true">
                <h3>{ "Edit task" }</h3>
                <input class="edit-input" value={(*draft).clone()} {oninput} {onkeydown} />
                <div class="modal-actions">
                    <button class="btn primary" disabled={draft.trim().is_empty()} onclick={move |_| save.emit(())}>{ "Save" }</button>
                    <button class="btn ghost" onclick={move |_| on_cancel.emit(())}>{ "Cancel" }</button>
                </div>
            </div>
        </>
    }
}

#[derive(Properties, PartialEq)]
pub struct StatsProps {
    pub stats: TaskStats,
}

#[function_component(Stats)]
pub fn stats(props: &StatsProps) -> Html {
    html! {
        <div class="stats">
            <div><strong>{ props.stats.total }</strong>{ " tasks" }</div>
            <div><strong>{ props.stats.done }</strong>{ " done" }</div>
            <div>{ format!("{}% complete", props.stats.percent_complete) }</div>
        </div>
    }
}

/// Shared handle to the identity provider. Compares by pointer so it can
/// travel through component props.
#[derive(Clone)]
pub struct ProviderHandle(pub Rc<dyn IdentityProvider>);

impl PartialEq for ProviderHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Properties, PartialEq)]
pub struct AuthPanelProps {
    pub provider: ProviderHandle,
    #[prop_or_default]
    pub redirect_to: String,
}

type FormEdit = Box<dyn FnOnce(&mut AuthForm)>;

/// Auth form behind a reducer, so edits that land after an await apply to
/// whatever the user has typed since.
#[derive(Debug, Clone, Default, PartialEq)]
struct FormState(AuthForm);

impl Deref for FormState {
    type Target = AuthForm;

    fn deref(&self) -> &AuthForm {
        &self.0
    }
}

impl Reducible for FormState {
    type Action = FormEdit;

    fn reduce(self: Rc<Self>, edit: FormEdit) -> Rc<Self> {
        let mut next = Rc::unwrap_or_clone(self);
        edit(&mut next.0);
        Rc::new(next)
    }
}

fn field_setter(
    form: &UseReducerHandle<FormState>,
    apply: fn(&mut AuthForm, String),
) -> Callback<InputEvent> {
    let form = form.dispatcher();
    Callback::from(move |e: InputEvent| {
        let value = input_value(e);
        form.dispatch(Box::new(move |current: &mut AuthForm| apply(current, value)));
    })
}

#[function_component(AuthPanel)]
pub fn auth_panel(props: &AuthPanelProps) -> Html {
    let form = use_reducer(FormState::default);
    let busy = use_state(|| false);

    let on_email = field_setter(&form, |form, value| form.email = value);
    let on_password = field_setter(&form, |form, value| form.password = value);
    let on_first_name = field_setter(&form, |form, value| form.first_name = value);
    let on_surname = field_setter(&form, |form, value| form.surname = value);

    let onsubmit = {
        let form = form.clone();
        let busy = busy.clone();
        let provider = props.provider.0.clone();
        Callback::from(move |e: SubmitEvent| {
            e.prevent_default();
            if *busy {
                return;
            }
            let request = form.0.clone().begin();
            form.dispatch(Box::new(|current: &mut AuthForm| {
                current.begin();
            }));
            let Some(request) = request else {
                return;
            };
            busy.set(true);

            let form = form.dispatcher();
            let busy = busy.clone();
            let provider = provider.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let outcome = request.send(&*provider).await;
                let mode = request.mode();
                form.dispatch(Box::new(move |current: &mut AuthForm| {
                    current.finish(mode, outcome)
                }));
                busy.set(false);
            });
        })
    };

    let on_google = {
        let form = form.dispatcher();
        let provider = props.provider.0.clone();
        let redirect_to = props.redirect_to.clone();
        Callback::from(move |_: MouseEvent| {
            form.dispatch(Box::new(AuthForm::clear_feedback));

            let form = form.clone();
            let provider = provider.clone();
            let redirect_to = redirect_to.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let oauth = OAuthProvider::Google;
                let outcome = provider.sign_in_with_oauth(oauth, &redirect_to).await;
                form.dispatch(Box::new(move |current: &mut AuthForm| {
                    current.finish_oauth(oauth, outcome)
                }));
            });
        })
    };

    let on_toggle_mode = {
        let form = form.dispatcher();
        Callback::from(move |_: MouseEvent| form.dispatch(Box::new(AuthForm::toggle_mode)))
    };

    let on_toggle_password = {
        let form = form.dispatcher();
        Callback::from(move |_: MouseEvent| {
            form.dispatch(Box::new(AuthForm::toggle_show_password))
        })
    };

    let is_sign_up = form.mode == AuthMode::SignUp;

    html! {
        <div class="auth-container">
            <div class="auth-card">
                <h2 class="auth-title">{ form.mode.title() }</h2>
                <form class="auth-form" novalidate={true} {onsubmit}>
                    {
                        if is_sign_up {
                            html! {
                                <>
                                    <input type="text" class="auth-input" placeholder="Enter your first name" value={form.first_name.clone()} oninput={on_first_name} />
                                    <input type="text" class="auth-input" placeholder="Enter your surname" value={form.surname.clone()} oninput={on_surname} />
                                </>
                            }
                        } else {
                            html! {}
                        }
                    }
                    <input type="email" class="auth-input" placeholder="Enter your email" value={form.email.clone()} oninput={on_email} />
                    <div class="auth-password-wrapper">
                        <input
                            type={if form.show_password { "text" } else { "password" }}
                            class="auth-input auth-input-password"
                            placeholder="Enter your password"
                            value={form.password.clone()}
                            oninput={on_password}
                        />
                        <button type="button" class="toggle-password-btn" onclick={on_toggle_password}>
                            { if form.show_password { "Hide" } else { "Show" } }
                        </button>
                    </div>
                    <button type="submit" class="auth-btn primary" disabled={*busy}>{ form.mode.title() }</button>
                    {
                        if let Some(error) = &form.error {
                            html! { <p class="auth-error">{ error }</p> }
                        } else {
                            html! {}
                        }
                    }
                    {
                        if let Some(message) = &form.message {
                            html! { <p class="auth-success">{ message }</p> }
                        } else {
                            html! {}
                        }
                    }
                </form>
                <p class="auth-toggle-text">{ form.mode.switch_prompt() }</p>
                <button type="button" class="auth-btn secondary" onclick={on_toggle_mode}>{ form.mode.other().title() }</button>
                <div class="auth-divider">{ "or" }</div>
                <button type="button" class="auth-btn google" onclick={on_google}>
                    { format!("Continue with {}", OAuthProvider::Google.label()) }
                </button>
            </div>
        </div>
    }
}
