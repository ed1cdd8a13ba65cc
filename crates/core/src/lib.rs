pub mod shared {
    pub mod bbox;
    pub mod config;
    pub mod constants;
    pub mod error;
    pub mod frame;
    pub mod timecode;
    pub mod video_metadata;
}

pub mod detection {
    pub mod domain {
        pub mod embedding_gate;
        pub mod face_embedder;
    }
    pub mod infrastructure;
}

pub mod tracking {
    pub mod domain {
        pub mod appearance_interval;
        pub mod interval_aggregator;
        pub mod track;
        pub mod track_manager;
    }
}

pub mod video {
    pub mod domain {
        pub mod image_reader;
        pub mod video_reader;
        pub mod video_writer;
    }
    pub mod infrastructure;
}

pub mod clipping {
    pub mod domain {
        pub mod clip;
        pub mod clip_extractor;
    }
}

pub mod pipeline {
    pub mod appearance_report;
    pub mod clip_executor;
    pub mod infrastructure;
    pub mod pipeline_logger;
    pub mod track_person_use_case;
}
