use std::cell::RefCell;
use std::rc::Rc;

use donemate_core::config::{
  Config,
  IdentityConfig
};
use donemate_core::identity::{
  Gate,
  IdentityProvider,
  LocalProvider,
  Session
};
use donemate_core::session::SessionReconciler;
use donemate_core::store::DurableStore;
use donemate_core::supabase::SupabaseEndpoints;
use donemate_core::task::TaskId;
use donemate_core::tasks::TaskList;
use donemate_core::theme::ThemeSynchronizer;
use gloo::timers::future::TimeoutFuture;
use yew::{
  Callback,
  Html,
  function_component,
  html,
  use_effect_with,
  use_state
};

use crate::components::{
  AddBar,
  AuthPanel,
  ConfirmModal,
  EditModal,
  Header,
  LoadingScreen,
  ProviderHandle,
  Stats,
  TaskItem
};
use crate::provider::SupabaseProvider;
use crate::web::{
  self,
  LocalStorageStore,
  MediaQueryHost,
  RootAttributeApplier
};

type Reconciler =
  SessionReconciler<dyn IdentityProvider>;
type SharedTasks =
  Rc<RefCell<TaskList<LocalStorageStore>>>;

fn build_provider(
  cfg: &IdentityConfig
) -> Rc<dyn IdentityProvider> {
  if !cfg.is_configured() {
    tracing::info!(
      "no identity provider \
       configured; running signed in \
       locally"
    );
    return Rc::new(LocalProvider::new());
  }

  match SupabaseEndpoints::new(
    &cfg.url,
    &cfg.anon_key
  ) {
    | Ok(endpoints) => {
      Rc::new(SupabaseProvider::new(
        endpoints
      ))
    }
    | Err(error) => {
      tracing::warn!(
        error = %format!("{error:#}"),
        "invalid identity provider \
         url; running signed in locally"
      );
      Rc::new(LocalProvider::new())
    }
  }
}

fn open_tasks(
  cfg: &Config
) -> SharedTasks {
  Rc::new(RefCell::new(
    TaskList::open(DurableStore::new(
      LocalStorageStore,
      cfg.storage.key.clone()
    ))
  ))
}

#[function_component(App)]
pub fn app() -> Html {
  let cfg = use_state(web::load_config);
  let list = {
    let cfg = (*cfg).clone();
    use_state(move || open_tasks(&cfg))
  };
  let tasks = {
    let list = list.clone();
    use_state(move || {
      list.borrow().tasks().clone()
    })
  };
  let theme_sync = {
    let policy =
      cfg.theme.override_policy;
    use_state(move || {
      Rc::new(ThemeSynchronizer::start(
        &MediaQueryHost::new(),
        Box::new(RootAttributeApplier),
        policy
      ))
    })
  };
  let theme = {
    let theme_sync = theme_sync.clone();
    use_state(move || {
      theme_sync.current()
    })
  };
  let session =
    use_state(|| Session::Pending);
  let reconciler =
    use_state(|| None::<Rc<Reconciler>>);
  let splash_elapsed =
    use_state(|| false);
  let pending_delete =
    use_state(|| None::<TaskId>);
  let confirm_clear =
    use_state(|| false);
  let editing =
    use_state(|| None::<TaskId>);

  {
    let list = list.clone();
    let tasks = tasks.clone();
    use_effect_with((), move |_| {
      let watch = list
        .borrow()
        .subscribe(move |next| {
          tasks.set(next.clone())
        });
      tracing::debug!(
        "watching task list"
      );
      move || drop(watch)
    });
  }

  {
    let theme_sync = theme_sync.clone();
    let theme = theme.clone();
    use_effect_with((), move |_| {
      let watch = theme_sync
        .subscribe(move |next| {
          theme.set(*next)
        });
      move || drop(watch)
    });
  }

  {
    let identity =
      cfg.identity.clone();
    let session = session.clone();
    let reconciler = reconciler.clone();
    use_effect_with((), move |_| {
      let (started, initial) =
        Reconciler::start(
          build_provider(&identity)
        );
      let started = Rc::new(started);
      let watch = started.subscribe(
        move |next| {
          session.set(next.clone())
        }
      );
      wasm_bindgen_futures::spawn_local(
        initial
      );
      reconciler.set(Some(started));
      move || drop(watch)
    });
  }

  {
    let splash_elapsed =
      splash_elapsed.clone();
    let delay_ms =
      cfg.startup.min_loading_ms;
    use_effect_with((), move |_| {
      wasm_bindgen_futures::spawn_local(
        async move {
          TimeoutFuture::new(delay_ms)
            .await;
          splash_elapsed.set(true);
        }
      );
      || ()
    });
  }

  let on_add = {
    let list = list.clone();
    Callback::from(
      move |text: String| {
        list.borrow_mut().add(&text);
      }
    )
  };

  let on_toggle = {
    let list = list.clone();
    Callback::from(move |id: TaskId| {
      list.borrow_mut().toggle(id);
    })
  };

  let on_ask_delete = {
    let pending_delete =
      pending_delete.clone();
    Callback::from(move |id: TaskId| {
      pending_delete.set(Some(id))
    })
  };

  let on_edit = {
    let editing = editing.clone();
    Callback::from(move |id: TaskId| {
      editing.set(Some(id))
    })
  };

  let on_confirm_delete = {
    let list = list.clone();
    let pending_delete =
      pending_delete.clone();
    Callback::from(move |()| {
      if let Some(id) = *pending_delete
      {
        list.borrow_mut().delete(id);
      }
      pending_delete.set(None);
    })
  };

  let on_cancel_delete = {
    let pending_delete =
      pending_delete.clone();
    Callback::from(move |()| {
      pending_delete.set(None)
    })
  };

  let on_save_edit = {
    let list = list.clone();
    let editing = editing.clone();
    Callback::from(
      move |(id, text): (
        TaskId,
        String
      )| {
        list
          .borrow_mut()
          .edit(id, &text);
        editing.set(None);
      }
    )
  };

  let on_cancel_edit = {
    let editing = editing.clone();
    Callback::from(move |()| {
      editing.set(None)
    })
  };

  let on_ask_clear = {
    let confirm_clear =
      confirm_clear.clone();
    Callback::from(
      move |_: web_sys::MouseEvent| {
        confirm_clear.set(true)
      }
    )
  };

  let on_confirm_clear = {
    let list = list.clone();
    let confirm_clear =
      confirm_clear.clone();
    Callback::from(move |()| {
      list.borrow_mut().clear_all();
      confirm_clear.set(false);
    })
  };

  let on_cancel_clear = {
    let confirm_clear =
      confirm_clear.clone();
    Callback::from(move |()| {
      confirm_clear.set(false)
    })
  };

  let on_toggle_theme = {
    let theme_sync = theme_sync.clone();
    Callback::from(move |()| {
      theme_sync.toggle();
    })
  };

  let on_logout = (*reconciler)
    .clone()
    .filter(|_| {
      cfg.identity.is_configured()
    })
    .map(|started| {
      Callback::from(move |()| {
        wasm_bindgen_futures::spawn_local(
          started.logout()
        )
      })
    });

  match session.gate(*splash_elapsed)
  {
    | Gate::Loading => {
      html! { <LoadingScreen /> }
    }
    | Gate::SignIn => {
      let Some(started) =
        (*reconciler).clone()
      else {
        return html! { <LoadingScreen /> };
      };
      html! {
        <div class="dm-app">
          <AuthPanel
            provider={ProviderHandle(started.provider().clone())}
            redirect_to={cfg.identity.redirect_to.clone()}
          />
        </div>
      }
    }
    | Gate::Tasks => {
      let user_label = session
        .identity()
        .map(|identity| {
          identity.label().to_string()
        });
      let stats = tasks.stats();
      let edit_target = (*editing)
        .and_then(|id| {
          tasks.get(id).cloned()
        });

      html! {
        <div class="dm-app">
          <Header
            theme={*theme}
            on_toggle_theme={on_toggle_theme}
            user_label={user_label}
            on_logout={on_logout}
          />

          <div class="dm-container">
            <aside class="dm-sidebar">
              <div class="sidebar-section">
                <p class="muted">{ "Quick actions" }</p>
                <button class="btn ghost" onclick={on_ask_clear} disabled={tasks.is_empty()}>
                  { "Clear all" }
                </button>
              </div>
              <div class="sidebar-section stats-box">
                <h4>{ "Stats" }</h4>
                <Stats stats={stats} />
              </div>
            </aside>

            <main class="dm-main">
              <AddBar on_add={on_add} />
              <section class="list-wrap">
                {
                  if tasks.is_empty() {
                    html! {
                      <div class="no-items-card">
                        <p>{ "No tasks yet. Add something to get started." }</p>
                      </div>
                    }
                  } else {
                    html! {
                      <ul class="task-list">
                        {
                          for tasks.iter().cloned().map(|task| html! {
                            <TaskItem
                              key={task.id().to_string()}
                              task={task}
                              on_toggle={on_toggle.clone()}
                              on_ask_delete={on_ask_delete.clone()}
                              on_edit={on_edit.clone()}
                            />
                          })
                        }
                      </ul>
                    }
                  }
                }
              </section>
            </main>
          </div>

          {
            if pending_delete.is_some() {
              html! {
                <ConfirmModal
                  title="Delete task"
                  description="Are you sure you want to delete this task?"
                  on_confirm={on_confirm_delete}
                  on_cancel={on_cancel_delete}
                />
              }
            } else {
              html! {}
            }
          }

          {
            if *confirm_clear {
              html! {
                <ConfirmModal
                  title="Delete all tasks"
                  description="This will remove all tasks permanently."
                  on_confirm={on_confirm_clear}
                  on_cancel={on_cancel_clear}
                />
              }
            } else {
              html! {}
            }
          }

          {
            if let Some(task) = edit_target {
              html! {
                <EditModal
                  key={task.id().to_string()}
                  task={task}
                  on_save={on_save_edit}
                  on_cancel={on_cancel_edit}
                />
              }
            } else {
              html! {}
            }
          }
        </div>
      }
    }
  }
}
