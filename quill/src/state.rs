use quill_service::JobService;

macro_rules! impl_from_ref {
    ($source:path; [ $($target:path => $extract_impl:expr),+ ]) => {
        $(
            impl ::axum::extract::FromRef<$source> for $target {
                fn from_ref(input: &$source) -> Self {
                    #[allow(clippy::redundant_closure_call)]
                    ($extract_impl)(input)
                }
            }
        )+
    };
}

impl_from_ref! {
    Zustand;
    [
        JobService => |input: &Zustand| input.service.job.clone()
    ]
}

/// Service collection
#[derive(Clone)]
pub struct Service {
    pub job: JobService,
}

/// Application state shared by the HTTP handlers
#[derive(Clone)]
pub struct Zustand {
    pub service: Service,
}
